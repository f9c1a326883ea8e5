use autosniper_core::AppConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    autosniper_app::init_tracing();

    let config = AppConfig::load_with_env()?;
    autosniper_app::run(config).await
}
