use anyhow::Result;
use vexrun::config::Config;
use vexrun::session::Session;
use vexrun::{logging, terminal};

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let config = Config::load()?;
    config.validate()?;

    logging::init(&config.log_dir);
    terminal::install_panic_hook_once();
    tracing::info!(
        working_dir = %config.working_dir.display(),
        log_dir = %config.log_dir.display(),
        "session started"
    );

    let mut session = Session::from_config(&config);
    let result = tokio::select! {
        result = session.run() => result,
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("interrupted");
            Ok(())
        }
    };
    session.shutdown().await;
    terminal::restore();
    tracing::info!("session ended");
    result
}
