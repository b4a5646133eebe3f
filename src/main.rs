use clap::Parser;
use thumbsmith::config::setup_logging;
use tracing::error;

#[tokio::main(flavor = "multi_thread")]
async fn main() {
    let cli = thumbsmith::cli::CliOptions::parse();

    if setup_logging(cli.debug).is_err() {
        return;
    }

    let state = match thumbsmith::web::AppState::from_cli(&cli) {
        Ok(state) => state,
        Err(err) => {
            error!("Startup configuration error: {}", err);
            return;
        }
    };

    if let Err(err) =
        thumbsmith::web::setup_server(&cli.listen_address, cli.port, state).await
    {
        error!("Application error: {}", err);
    }
}
