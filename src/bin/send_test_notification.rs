//! Posts a test push notification to an Expo push token.
//!
//! Usage: send_test_notification <EXPO_PUSH_TOKEN> [--endpoint URL]

use std::process::ExitCode;

use clap::Parser;
use tracing::{error, info};

use exphive::push::{PushClient, PushMessage, EXPO_PUSH_ENDPOINT};

#[derive(Parser, Debug)]
#[command(about = "Send a test push notification")]
struct Args {
    /// Expo push token of the receiving device
    token: Option<String>,

    /// Push API endpoint
    #[arg(long, default_value = EXPO_PUSH_ENDPOINT)]
    endpoint: String,
}

#[tokio::main]
async fn main() -> ExitCode {
    exphive::init_tracing();
    let args = Args::parse();

    let Some(token) = args.token else {
        eprintln!("Please provide your Expo Push Token as an argument");
        return ExitCode::from(1);
    };

    let client = PushClient::new(args.endpoint);
    match client.send(&PushMessage::test(token)).await {
        Ok(response) => {
            info!(%response, "Notification sent successfully!");
            ExitCode::SUCCESS
        }
        Err(err) => {
            error!(error = %err, "Error sending notification");
            ExitCode::from(1)
        }
    }
}
