use clap::{Parser, Subcommand};
use serde_json::{json, Value};

#[derive(Parser)]
#[command(name = "kms-cli")]
#[command(about = "Admin client for the wallet KMS", long_about = None)]
struct Cli {
    #[arg(short, long, default_value = "http://localhost:8080")]
    url: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check secret backend and chain health
    Health,
    /// Create a wallet
    CreateWallet {
        #[arg(long)]
        name: String,
        /// secp256k1 or ed25519
        #[arg(long, default_value = "secp256k1")]
        algorithm: String,
    },
    /// Native balance of an address
    Balance {
        #[arg(long)]
        address: String,
        #[arg(long)]
        chain_id: Option<u64>,
    },
    /// Sign a message with a wallet
    SignMessage {
        #[arg(long)]
        wallet_id: String,
        #[arg(long)]
        message: String,
    },
    /// Verify a message signature against a wallet
    Verify {
        #[arg(long)]
        wallet_id: String,
        #[arg(long)]
        message: String,
        #[arg(long)]
        signature: String,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let client = reqwest::Client::new();
    let base = format!("{}/wallet", cli.url.trim_end_matches('/'));

    let res = match cli.command {
        Commands::Health => client.get(format!("{}/health", base)).send().await?,
        Commands::CreateWallet { name, algorithm } => {
            client
                .post(format!("{}/createWallet", base))
                .json(&json!({ "name": name, "algorithm": algorithm }))
                .send()
                .await?
        }
        Commands::Balance { address, chain_id } => {
            client
                .post(format!("{}/getBalance", base))
                .json(&json!({ "address": address, "chainId": chain_id }))
                .send()
                .await?
        }
        Commands::SignMessage { wallet_id, message } => {
            client
                .post(format!("{}/signMessage", base))
                .json(&json!({ "walletId": wallet_id, "message": message }))
                .send()
                .await?
        }
        Commands::Verify {
            wallet_id,
            message,
            signature,
        } => {
            client
                .post(format!("{}/verifySignature", base))
                .json(&json!({
                    "walletId": wallet_id,
                    "message": message,
                    "signature": signature,
                }))
                .send()
                .await?
        }
    };

    print_response(res).await
}

async fn print_response(res: reqwest::Response) -> Result<(), Box<dyn std::error::Error>> {
    let status = res.status();
    let text = res.text().await?;
    match serde_json::from_str::<Value>(&text) {
        Ok(json) => println!("{}", serde_json::to_string_pretty(&json)?),
        Err(_) => println!("{}", text),
    }
    if !status.is_success() {
        eprintln!("Error: KMS returned status {}", status);
        std::process::exit(1);
    }
    Ok(())
}
