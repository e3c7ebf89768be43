use argh::FromArgs;
use axum::{
    Json, Router,
    extract::{DefaultBodyLimit, Multipart, State},
    http::StatusCode,
    response::{Html, IntoResponse, Response},
    routing::{get, post},
};
use base64::{Engine, engine::general_purpose::STANDARD};
use serde_json::json;
use std::{path::PathBuf, sync::Arc};
use vlm_locate::{
    AnthropicClient, ClientConfig, OverlayStyle, ShellInputs, config::DEFAULT_ENDPOINT, shell,
};

mod messages;

// defaults for the server
const DEFAULT_HOST: &str = "0.0.0.0";
const DEFAULT_PORT: u16 = 3000;
const MAX_UPLOAD_BYTES: usize = 20 * 1024 * 1024;

const INDEX_HTML: &str = include_str!("static/index.html");

#[derive(FromArgs)]
/// Serves a page that locates objects in uploaded images.
struct LocateArgs {
    /// the host to run the server on
    #[argh(option, short = 'h', default = "DEFAULT_HOST.to_string()")]
    host: String,

    /// the port to run the server on
    #[argh(option, short = 'p', default = "DEFAULT_PORT")]
    port: u16,

    /// a TrueType font for the box labels (system fonts are tried otherwise)
    #[argh(option, short = 'f')]
    font: Option<PathBuf>,

    /// the Messages API endpoint to call
    #[argh(option, default = "DEFAULT_ENDPOINT.to_string()")]
    endpoint: String,
}

struct AppState {
    config: ClientConfig,
    style: OverlayStyle,
}

type BoxError = Box<dyn std::error::Error + Send + Sync>;

async fn get_index() -> Html<&'static str> {
    Html(INDEX_HTML)
}

async fn post_detect(State(state): State<Arc<AppState>>, mut multipart: Multipart) -> Response {
    let inputs = match read_inputs(&mut multipart).await {
        Ok(inputs) => inputs,
        Err(error_msg) => {
            return (StatusCode::BAD_REQUEST, Json(json!({ "error": error_msg }))).into_response();
        }
    };

    // the inference call blocks, keep it off the async workers
    let outcome = tokio::task::spawn_blocking(move || -> Result<_, BoxError> {
        let mut client = AnthropicClient::new(state.config.clone())?;
        let outcome = shell::run(&inputs, &mut client, &state.style);
        let image = outcome.view_png()?.map(|png| STANDARD.encode(png));

        Ok(messages::DetectResponse {
            notices: outcome.notices,
            image,
            detection: outcome.detection,
        })
    })
    .await;

    match outcome {
        Ok(Ok(response)) => {
            log::info!("Detection request handled");
            (StatusCode::OK, Json(response)).into_response()
        }
        Ok(Err(e)) => {
            log::error!("Detection request failed: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": e.to_string() })),
            )
                .into_response()
        }
        Err(e) => {
            log::error!("Detection task panicked: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": "detection task failed" })),
            )
                .into_response()
        }
    }
}

// Helper function
async fn read_inputs(multipart: &mut Multipart) -> Result<ShellInputs, String> {
    let mut inputs = ShellInputs::default();

    while let Some(field) = multipart.next_field().await.map_err(|e| e.to_string())? {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "api_key" => inputs.api_key = field.text().await.map_err(|e| e.to_string())?,
            "prompt" => inputs.prompt = field.text().await.map_err(|e| e.to_string())?,
            "threshold" => {
                let text = field.text().await.map_err(|e| e.to_string())?;
                if !text.trim().is_empty() {
                    inputs.threshold = text
                        .trim()
                        .parse()
                        .map_err(|_| format!("Invalid threshold: {}", text))?;
                }
            }
            "image" => {
                let bytes = field.bytes().await.map_err(|e| e.to_string())?;
                if !bytes.is_empty() {
                    inputs.upload = Some(bytes.to_vec());
                }
            }
            other => log::debug!("Ignoring form field '{}'", other),
        }
    }

    Ok(inputs)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    let args: LocateArgs = argh::from_env();

    // format the host and port
    let addr = format!("{}:{}", args.host, args.port);

    let style = match &args.font {
        Some(path) => OverlayStyle::with_font_path(path)?,
        None => OverlayStyle::with_system_font(),
    };
    let state = Arc::new(AppState {
        config: ClientConfig::with_endpoint(args.endpoint),
        style,
    });

    let app = Router::new()
        .route("/", get(get_index))
        .route("/detect", post(post_detect))
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .with_state(state);

    log::info!("Starting the object locator");
    log::info!("Listening on: http://{}", addr);
    log::info!("Press Ctrl+C to stop the server");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
