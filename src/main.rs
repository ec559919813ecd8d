use clap::Parser;
use std::process::ExitCode;

use webwarden::cli::{Cli, Command};
use webwarden::config::SpiderConfig;
use webwarden::crawler::Spider;
use webwarden::logging;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    match cli.command {
        Command::Crawl(args) => {
            let order = args.frontier_order();
            let config = match args.into_config() {
                Ok(config) => config,
                Err(e) => {
                    eprintln!("error: {}", e);
                    return ExitCode::FAILURE;
                }
            };

            if let Err(e) = logging::init_logging(&config.log_level, config.log_file.as_deref()) {
                eprintln!("error: failed to initialize logging: {}", e);
                return ExitCode::FAILURE;
            }

            let output_file = config.output_file.clone();
            let spider = Spider::with_order(config, order);

            // Ctrl-C requests a graceful stop; the report still gets written.
            let trigger = spider.shutdown_trigger();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    tracing::info!("interrupt received, finishing current page");
                    let _ = trigger.send(true);
                }
            });

            let report = spider.run().await;

            let json = match report.to_json_pretty() {
                Ok(json) => json,
                Err(e) => {
                    tracing::error!(error = %e, "failed to serialize report");
                    return ExitCode::FAILURE;
                }
            };

            match output_file {
                Some(path) => {
                    if let Err(e) = report.save_to_file(&path) {
                        tracing::error!(error = %e, path, "failed to write report");
                        return ExitCode::FAILURE;
                    }
                }
                None => println!("{}", json),
            }

            ExitCode::SUCCESS
        }
        Command::InitConfig { output } => {
            let config = SpiderConfig {
                start_url: "https://example.com".to_string(),
                ..Default::default()
            };

            match config.save_to_file(&output) {
                Ok(()) => {
                    println!("wrote default configuration to {}", output);
                    ExitCode::SUCCESS
                }
                Err(e) => {
                    eprintln!("error: {}", e);
                    ExitCode::FAILURE
                }
            }
        }
    }
}
