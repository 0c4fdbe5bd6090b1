use std::sync::Arc;
use std::time::Duration;
use clap::Parser;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use lb_proxy::origin::parse_duration;

#[derive(Parser)]
#[command(name = "lb-test-client")]
#[command(about = "Send a burst of requests through the load balancer", long_about = None)]
struct Cli {
    /// Number of requests to send
    #[arg(short = 'n', default_value_t = 10)]
    requests: usize,

    /// Maximum requests in flight
    #[arg(short = 'c', default_value_t = 3)]
    concurrency: usize,

    /// Pause between starting requests, e.g. 100ms
    #[arg(short = 'i', default_value = "100ms", value_parser = parse_duration)]
    interval: Duration,

    /// Load balancer URL
    #[arg(long, default_value = "http://localhost:8080")]
    url: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let client = reqwest::Client::new();
    let semaphore = Arc::new(Semaphore::new(cli.concurrency.max(1)));
    let mut tasks = JoinSet::new();

    println!(
        "Sending {} requests to {} with {} concurrent requests",
        cli.requests, cli.url, cli.concurrency
    );

    for n in 1..=cli.requests {
        let permit = semaphore.clone().acquire_owned().await?;
        let client = client.clone();
        let url = cli.url.clone();

        tasks.spawn(async move {
            let _permit = permit;
            match client.get(&url).send().await {
                Ok(res) => {
                    let status = res.status();
                    match res.text().await {
                        Ok(body) => println!(
                            "[CLIENT] Request {}: Status={}, Body={}",
                            n,
                            status.as_u16(),
                            body.trim_end()
                        ),
                        Err(e) => eprintln!("Failed to read response {}: {}", n, e),
                    }
                }
                Err(e) => eprintln!("Request {} failed: {}", n, e),
            }
        });

        if n < cli.requests {
            tokio::time::sleep(cli.interval).await;
        }
    }

    while tasks.join_next().await.is_some() {}

    println!("\nAll requests completed!");
    Ok(())
}
