use argh::FromArgs;
use base64::{Engine, engine::general_purpose::STANDARD};
use std::path::PathBuf;

mod messages;

// defaults for the client
const DEFAULT_HOST: &str = "localhost";
const DEFAULT_PORT: u16 = 3000;
const DEFAULT_THRESHOLD: f32 = 0.5;

#[derive(FromArgs)]
/// Object locator client: sends an image and a label, saves the annotated result
struct ClientArgs {
    /// the host to connect to
    #[argh(option, short = 'h', default = "DEFAULT_HOST.to_string()")]
    host: String,

    /// the port to connect to
    #[argh(option, short = 'p', default = "DEFAULT_PORT")]
    port: u16,

    /// the path to the image
    #[argh(option, short = 'i')]
    image_path: PathBuf,

    /// the object to locate
    #[argh(option, short = 'l')]
    label: String,

    /// the inference API key
    #[argh(option, short = 'k')]
    api_key: String,

    /// minimum confidence for drawing a box
    #[argh(option, short = 't', default = "DEFAULT_THRESHOLD")]
    threshold: f32,

    /// where to write the returned image
    #[argh(option, short = 'o')]
    output: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    let args: ClientArgs = argh::from_env();

    let client = reqwest::Client::new();

    // format the host and port
    let addr = format!("{}:{}", args.host, args.port);

    let file_name = args
        .image_path
        .file_name()
        .map(|name| name.to_string_lossy().to_string())
        .unwrap_or_else(|| "upload".to_string());
    let bytes = tokio::fs::read(&args.image_path).await?;

    let form = reqwest::multipart::Form::new()
        .text("api_key", args.api_key)
        .text("prompt", args.label)
        .text("threshold", args.threshold.to_string())
        .part(
            "image",
            reqwest::multipart::Part::bytes(bytes).file_name(file_name),
        );

    let response = client
        .post(format!("http://{}/detect", addr))
        .multipart(form)
        .send()
        .await?;

    if !response.status().is_success() {
        let result = response.json::<serde_json::Value>().await?;
        println!("Error: {}", serde_json::to_string_pretty(&result)?);
        return Ok(());
    }

    let result = response.json::<messages::DetectResponse>().await?;
    for notice in &result.notices {
        println!("[{:?}] {}", notice.level, notice.message);
    }
    if let Some(detection) = &result.detection {
        println!("Result: {}", serde_json::to_string_pretty(detection)?);
    }

    if let (Some(output), Some(image)) = (args.output, result.image) {
        tokio::fs::write(&output, STANDARD.decode(image)?).await?;
        println!("Saved image to {}", output.display());
    }

    Ok(())
}
