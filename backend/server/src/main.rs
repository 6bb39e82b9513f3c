#[tokio::main]
async fn main() {
    if let Err(e) = shorts_server::start_server().await {
        eprintln!("Server failed: {e}");
        std::process::exit(1);
    }
}
