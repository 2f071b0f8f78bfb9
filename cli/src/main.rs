fn main() -> anyhow::Result<()> {
    datamodel_cli::run()
}
