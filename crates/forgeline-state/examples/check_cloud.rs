//! Quick cloud connection check
//! Run with: cargo run --package forgeline-state --example check_cloud

use forgeline_state::{connection, CloudConfig};

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    println!("Checking SurrealDB Cloud connection...");

    match CloudConfig::from_env() {
        Ok(config) => {
            println!("  Endpoint: {}", config.endpoint);
            println!("  Namespace: {}", config.namespace);
            println!("  Database: {}", config.database);
            println!("  User: {}", config.username);

            match connection::connect_cloud(&config).await {
                Ok(_db) => {
                    println!("\n✓ Connected, actions and logs tables ready");
                }
                Err(e) => {
                    eprintln!("\n✗ Connection failed: {}", e);
                    std::process::exit(1);
                }
            }
        }
        Err(e) => {
            eprintln!("✗ Missing environment variables: {}", e);
            std::process::exit(1);
        }
    }
}
