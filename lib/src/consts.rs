//! Defines constant NamedNodeRefs for the RDF terms used when assembling data model graphs,
//! drawn from the RDF, RDFS, OWL, XSD, SHACL, SKOS, DCTERMS, DCAM, PROV, VOID and IOW vocabularies.

use oxigraph::model::NamedNodeRef;

// namespaces
pub const RDF_NS: &str = "http://www.w3.org/1999/02/22-rdf-syntax-ns#";
pub const RDFS_NS: &str = "http://www.w3.org/2000/01/rdf-schema#";
pub const OWL_NS: &str = "http://www.w3.org/2002/07/owl#";
pub const XSD_NS: &str = "http://www.w3.org/2001/XMLSchema#";
pub const SH_NS: &str = "http://www.w3.org/ns/shacl#";
pub const SKOS_NS: &str = "http://www.w3.org/2004/02/skos/core#";
pub const DCTERMS_NS: &str = "http://purl.org/dc/terms/";
pub const DCAM_NS: &str = "http://purl.org/dc/dcam/";
pub const PROV_NS: &str = "http://www.w3.org/ns/prov#";
pub const VOID_NS: &str = "http://rdfs.org/ns/void#";
pub const FOAF_NS: &str = "http://xmlns.com/foaf/0.1/";
pub const DCAP_NS: &str = "http://purl.org/ws-mmi-dc/terms/";
pub const IOW_NS: &str = "http://uri.suomi.fi/datamodel/ns/iow#";

// graph name suffixes of the derived model graphs
pub const HAS_PART_GRAPH_SUFFIX: &str = "#HasPartGraph";
pub const EXPORT_GRAPH_SUFFIX: &str = "#ExportGraph";
pub const POSITION_GRAPH_SUFFIX: &str = "#PositionGraph";

pub const UUID_URN_PREFIX: &str = "urn:uuid:";

// rdf
pub const TYPE: NamedNodeRef<'_> =
    NamedNodeRef::new_unchecked("http://www.w3.org/1999/02/22-rdf-syntax-ns#type");
pub const LANG_STRING: NamedNodeRef<'_> =
    NamedNodeRef::new_unchecked("http://www.w3.org/1999/02/22-rdf-syntax-ns#langString");
pub const RDF_FIRST: NamedNodeRef<'_> =
    NamedNodeRef::new_unchecked("http://www.w3.org/1999/02/22-rdf-syntax-ns#first");
pub const RDF_REST: NamedNodeRef<'_> =
    NamedNodeRef::new_unchecked("http://www.w3.org/1999/02/22-rdf-syntax-ns#rest");
pub const RDF_NIL: NamedNodeRef<'_> =
    NamedNodeRef::new_unchecked("http://www.w3.org/1999/02/22-rdf-syntax-ns#nil");

// rdfs
pub const LABEL: NamedNodeRef<'_> =
    NamedNodeRef::new_unchecked("http://www.w3.org/2000/01/rdf-schema#label");
pub const COMMENT: NamedNodeRef<'_> =
    NamedNodeRef::new_unchecked("http://www.w3.org/2000/01/rdf-schema#comment");
pub const DEFINED_BY: NamedNodeRef<'_> =
    NamedNodeRef::new_unchecked("http://www.w3.org/2000/01/rdf-schema#isDefinedBy");
pub const RDFS_CLASS: NamedNodeRef<'_> =
    NamedNodeRef::new_unchecked("http://www.w3.org/2000/01/rdf-schema#Class");
pub const SUB_CLASS_OF: NamedNodeRef<'_> =
    NamedNodeRef::new_unchecked("http://www.w3.org/2000/01/rdf-schema#subClassOf");
pub const SUB_PROPERTY_OF: NamedNodeRef<'_> =
    NamedNodeRef::new_unchecked("http://www.w3.org/2000/01/rdf-schema#subPropertyOf");
pub const DOMAIN: NamedNodeRef<'_> =
    NamedNodeRef::new_unchecked("http://www.w3.org/2000/01/rdf-schema#domain");
pub const RANGE: NamedNodeRef<'_> =
    NamedNodeRef::new_unchecked("http://www.w3.org/2000/01/rdf-schema#range");

// owl
pub const ONTOLOGY: NamedNodeRef<'_> =
    NamedNodeRef::new_unchecked("http://www.w3.org/2002/07/owl#Ontology");
pub const OWL_CLASS: NamedNodeRef<'_> =
    NamedNodeRef::new_unchecked("http://www.w3.org/2002/07/owl#Class");
pub const DATATYPE_PROPERTY: NamedNodeRef<'_> =
    NamedNodeRef::new_unchecked("http://www.w3.org/2002/07/owl#DatatypeProperty");
pub const OBJECT_PROPERTY: NamedNodeRef<'_> =
    NamedNodeRef::new_unchecked("http://www.w3.org/2002/07/owl#ObjectProperty");
pub const VERSION_INFO: NamedNodeRef<'_> =
    NamedNodeRef::new_unchecked("http://www.w3.org/2002/07/owl#versionInfo");
pub const IMPORTS: NamedNodeRef<'_> =
    NamedNodeRef::new_unchecked("http://www.w3.org/2002/07/owl#imports");

// shacl
pub const NODE_SHAPE: NamedNodeRef<'_> =
    NamedNodeRef::new_unchecked("http://www.w3.org/ns/shacl#NodeShape");
pub const SH_SHAPE: NamedNodeRef<'_> =
    NamedNodeRef::new_unchecked("http://www.w3.org/ns/shacl#Shape");
pub const PROPERTY_SHAPE: NamedNodeRef<'_> =
    NamedNodeRef::new_unchecked("http://www.w3.org/ns/shacl#PropertyShape");
pub const SH_PROPERTY: NamedNodeRef<'_> =
    NamedNodeRef::new_unchecked("http://www.w3.org/ns/shacl#property");
pub const SH_PATH: NamedNodeRef<'_> =
    NamedNodeRef::new_unchecked("http://www.w3.org/ns/shacl#path");
pub const SH_PREDICATE: NamedNodeRef<'_> =
    NamedNodeRef::new_unchecked("http://www.w3.org/ns/shacl#predicate");
pub const SH_NAME: NamedNodeRef<'_> =
    NamedNodeRef::new_unchecked("http://www.w3.org/ns/shacl#name");
pub const SH_DESCRIPTION: NamedNodeRef<'_> =
    NamedNodeRef::new_unchecked("http://www.w3.org/ns/shacl#description");
pub const SH_DATATYPE: NamedNodeRef<'_> =
    NamedNodeRef::new_unchecked("http://www.w3.org/ns/shacl#datatype");
pub const SH_MIN_COUNT: NamedNodeRef<'_> =
    NamedNodeRef::new_unchecked("http://www.w3.org/ns/shacl#minCount");
pub const SH_MAX_COUNT: NamedNodeRef<'_> =
    NamedNodeRef::new_unchecked("http://www.w3.org/ns/shacl#maxCount");
pub const SH_MIN_LENGTH: NamedNodeRef<'_> =
    NamedNodeRef::new_unchecked("http://www.w3.org/ns/shacl#minLength");
pub const SH_MAX_LENGTH: NamedNodeRef<'_> =
    NamedNodeRef::new_unchecked("http://www.w3.org/ns/shacl#maxLength");
pub const SH_PATTERN: NamedNodeRef<'_> =
    NamedNodeRef::new_unchecked("http://www.w3.org/ns/shacl#pattern");
pub const SH_IN: NamedNodeRef<'_> = NamedNodeRef::new_unchecked("http://www.w3.org/ns/shacl#in");
pub const SH_DEFAULT_VALUE: NamedNodeRef<'_> =
    NamedNodeRef::new_unchecked("http://www.w3.org/ns/shacl#defaultValue");
pub const SH_INDEX: NamedNodeRef<'_> =
    NamedNodeRef::new_unchecked("http://www.w3.org/ns/shacl#index");
pub const SH_CLASS: NamedNodeRef<'_> =
    NamedNodeRef::new_unchecked("http://www.w3.org/ns/shacl#class");
pub const SH_NODE: NamedNodeRef<'_> =
    NamedNodeRef::new_unchecked("http://www.w3.org/ns/shacl#node");
pub const SH_TARGET_CLASS: NamedNodeRef<'_> =
    NamedNodeRef::new_unchecked("http://www.w3.org/ns/shacl#targetClass");
pub const SH_NODE_KIND: NamedNodeRef<'_> =
    NamedNodeRef::new_unchecked("http://www.w3.org/ns/shacl#nodeKind");
pub const SH_VALUE_SHAPE: NamedNodeRef<'_> =
    NamedNodeRef::new_unchecked("http://www.w3.org/ns/shacl#valueShape");

// skos
pub const PREF_LABEL: NamedNodeRef<'_> =
    NamedNodeRef::new_unchecked("http://www.w3.org/2004/02/skos/core#prefLabel");
pub const DEFINITION: NamedNodeRef<'_> =
    NamedNodeRef::new_unchecked("http://www.w3.org/2004/02/skos/core#definition");
pub const SKOS_CONCEPT: NamedNodeRef<'_> =
    NamedNodeRef::new_unchecked("http://www.w3.org/2004/02/skos/core#Concept");
pub const IN_SCHEME: NamedNodeRef<'_> =
    NamedNodeRef::new_unchecked("http://www.w3.org/2004/02/skos/core#inScheme");
pub const EDITORIAL_NOTE: NamedNodeRef<'_> =
    NamedNodeRef::new_unchecked("http://www.w3.org/2004/02/skos/core#editorialNote");

// dcterms
pub const HAS_PART: NamedNodeRef<'_> =
    NamedNodeRef::new_unchecked("http://purl.org/dc/terms/hasPart");
pub const IS_PART_OF: NamedNodeRef<'_> =
    NamedNodeRef::new_unchecked("http://purl.org/dc/terms/isPartOf");
pub const CREATED: NamedNodeRef<'_> =
    NamedNodeRef::new_unchecked("http://purl.org/dc/terms/created");
pub const MODIFIED: NamedNodeRef<'_> =
    NamedNodeRef::new_unchecked("http://purl.org/dc/terms/modified");
pub const IDENTIFIER: NamedNodeRef<'_> =
    NamedNodeRef::new_unchecked("http://purl.org/dc/terms/identifier");
pub const SUBJECT: NamedNodeRef<'_> =
    NamedNodeRef::new_unchecked("http://purl.org/dc/terms/subject");
pub const CONTRIBUTOR: NamedNodeRef<'_> =
    NamedNodeRef::new_unchecked("http://purl.org/dc/terms/contributor");
pub const REQUIRES: NamedNodeRef<'_> =
    NamedNodeRef::new_unchecked("http://purl.org/dc/terms/requires");
pub const LANGUAGE: NamedNodeRef<'_> =
    NamedNodeRef::new_unchecked("http://purl.org/dc/terms/language");
pub const DCTERMS_TITLE: NamedNodeRef<'_> =
    NamedNodeRef::new_unchecked("http://purl.org/dc/terms/title");

// dcam
pub const MEMBER_OF: NamedNodeRef<'_> =
    NamedNodeRef::new_unchecked("http://purl.org/dc/dcam/memberOf");

// dcap
pub const PREFERRED_XMLNS_PREFIX: NamedNodeRef<'_> =
    NamedNodeRef::new_unchecked("http://purl.org/ws-mmi-dc/terms/preferredXMLNamespacePrefix");
pub const PREFERRED_XMLNS_NAME: NamedNodeRef<'_> =
    NamedNodeRef::new_unchecked("http://purl.org/ws-mmi-dc/terms/preferredXMLNamespaceName");

// prov
pub const PROV_ENTITY: NamedNodeRef<'_> =
    NamedNodeRef::new_unchecked("http://www.w3.org/ns/prov#Entity");
pub const PROV_ACTIVITY: NamedNodeRef<'_> =
    NamedNodeRef::new_unchecked("http://www.w3.org/ns/prov#Activity");
pub const PROV_USED: NamedNodeRef<'_> =
    NamedNodeRef::new_unchecked("http://www.w3.org/ns/prov#used");
pub const PROV_GENERATED: NamedNodeRef<'_> =
    NamedNodeRef::new_unchecked("http://www.w3.org/ns/prov#generated");
pub const PROV_WAS_REVISION_OF: NamedNodeRef<'_> =
    NamedNodeRef::new_unchecked("http://www.w3.org/ns/prov#wasRevisionOf");
pub const PROV_WAS_ATTRIBUTED_TO: NamedNodeRef<'_> =
    NamedNodeRef::new_unchecked("http://www.w3.org/ns/prov#wasAttributedTo");
pub const PROV_WAS_DERIVED_FROM: NamedNodeRef<'_> =
    NamedNodeRef::new_unchecked("http://www.w3.org/ns/prov#wasDerivedFrom");
pub const PROV_GENERATED_AT_TIME: NamedNodeRef<'_> =
    NamedNodeRef::new_unchecked("http://www.w3.org/ns/prov#generatedAtTime");
pub const PROV_STARTED_AT_TIME: NamedNodeRef<'_> =
    NamedNodeRef::new_unchecked("http://www.w3.org/ns/prov#startedAtTime");

// void
pub const ROOT_RESOURCE: NamedNodeRef<'_> =
    NamedNodeRef::new_unchecked("http://rdfs.org/ns/void#rootResource");

// iow
pub const IOW_STATUS: NamedNodeRef<'_> =
    NamedNodeRef::new_unchecked("http://uri.suomi.fi/datamodel/ns/iow#status");
pub const IOW_POSITION_X: NamedNodeRef<'_> =
    NamedNodeRef::new_unchecked("http://uri.suomi.fi/datamodel/ns/iow#posX");
pub const IOW_POSITION_Y: NamedNodeRef<'_> =
    NamedNodeRef::new_unchecked("http://uri.suomi.fi/datamodel/ns/iow#posY");
pub const IOW_POINT_X_Y: NamedNodeRef<'_> =
    NamedNodeRef::new_unchecked("http://uri.suomi.fi/datamodel/ns/iow#pointXY");
pub const IOW_ATTRIBUTE: NamedNodeRef<'_> =
    NamedNodeRef::new_unchecked("http://uri.suomi.fi/datamodel/ns/iow#Attribute");
pub const IOW_ASSOCIATION: NamedNodeRef<'_> =
    NamedNodeRef::new_unchecked("http://uri.suomi.fi/datamodel/ns/iow#Association");
pub const IOW_LOCAL_NAME: NamedNodeRef<'_> =
    NamedNodeRef::new_unchecked("http://uri.suomi.fi/datamodel/ns/iow#localName");
pub const IOW_CODE_LIST: NamedNodeRef<'_> =
    NamedNodeRef::new_unchecked("http://uri.suomi.fi/datamodel/ns/iow#codeList");

// xsd
pub const XSD_STRING: NamedNodeRef<'_> =
    NamedNodeRef::new_unchecked("http://www.w3.org/2001/XMLSchema#string");
pub const XSD_INTEGER: NamedNodeRef<'_> =
    NamedNodeRef::new_unchecked("http://www.w3.org/2001/XMLSchema#integer");
pub const XSD_DATE_TIME: NamedNodeRef<'_> =
    NamedNodeRef::new_unchecked("http://www.w3.org/2001/XMLSchema#dateTime");
pub const XSD_BOOLEAN: NamedNodeRef<'_> =
    NamedNodeRef::new_unchecked("http://www.w3.org/2001/XMLSchema#boolean");
pub const XSD_DECIMAL: NamedNodeRef<'_> =
    NamedNodeRef::new_unchecked("http://www.w3.org/2001/XMLSchema#decimal");

/// Predicates whose objects are rewritten when a resource IRI inside a model changes.
pub const RESOURCE_REFERENCE_PREDICATES: [NamedNodeRef<'_>; 8] = [
    SUB_CLASS_OF,
    SUB_PROPERTY_OF,
    DOMAIN,
    RANGE,
    SH_CLASS,
    SH_NODE,
    SH_VALUE_SHAPE,
    SH_TARGET_CLASS,
];

/// Predicates under which a property IRI may be referenced by a property shape.
pub const PREDICATE_REFERENCE_PREDICATES: [NamedNodeRef<'_>; 2] = [SH_PATH, SH_PREDICATE];
