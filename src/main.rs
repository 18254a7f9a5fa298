fn main() -> anyhow::Result<()> {
    timeshot_lib::run()
}
