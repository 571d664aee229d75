fn main() -> anyhow::Result<()> {
    booknook::cli::run()
}
