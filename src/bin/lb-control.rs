use clap::Parser;
use lb_proxy::origin::{parse_duration, CONTROL_PATH};

#[derive(Parser)]
#[command(name = "lb-control")]
#[command(about = "Toggle failure mode and response delay on a test backend", long_about = None)]
struct Cli {
    /// Port of the test backend to control
    #[arg(short, long)]
    port: u16,

    /// Host the test backend runs on
    #[arg(long, default_value = "localhost")]
    host: String,

    /// Force failures (true) or resume normal service (false)
    #[arg(short, long)]
    fail: Option<bool>,

    /// Response delay, e.g. 1s, 500ms, 0
    #[arg(short, long, value_parser = check_delay)]
    delay: Option<String>,
}

fn check_delay(value: &str) -> Result<String, String> {
    parse_duration(value).map(|_| value.to_string()).map_err(|e| e.to_string())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let mut query = Vec::new();
    if let Some(fail) = cli.fail {
        query.push(("failure", fail.to_string()));
    }
    if let Some(delay) = cli.delay {
        query.push(("delay", delay));
    }
    if query.is_empty() {
        eprintln!("Nothing to change: pass --fail and/or --delay");
        std::process::exit(2);
    }

    let url = format!("http://{}:{}{}", cli.host, cli.port, CONTROL_PATH);
    let res = reqwest::Client::new().post(&url).query(&query).send().await?;

    let status = res.status();
    let body = res.text().await.unwrap_or_default();
    if status.is_success() {
        println!("Successfully updated backend on port {}", cli.port);
    } else {
        eprintln!("Failed to update backend. Status: {}", status);
        if !body.is_empty() {
            eprintln!("Response: {}", body.trim_end());
        }
        std::process::exit(1);
    }

    Ok(())
}
