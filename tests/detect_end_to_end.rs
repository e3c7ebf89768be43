use axum::{Json, Router, http::HeaderMap, http::StatusCode, routing::post};
use base64::{Engine, engine::general_purpose::STANDARD};
use image::{DynamicImage, ImageFormat, Rgb, RgbImage, Rgba};
use serde_json::{Value, json};
use std::{
    io::Cursor,
    sync::{Arc, Mutex},
};
use vlm_locate::{
    AnthropicClient, ClientConfig, DetectError, DetectionModel, DetectionRequest,
    DetectionResult, NoticeLevel, OverlayStyle, ResultView, ShellInputs, codec, shell,
};

const BASE: Rgb<u8> = Rgb([40, 80, 160]);

type Captured = Arc<Mutex<Vec<(HeaderMap, Value)>>>;

/// Serves `reply` for every POST to `/v1/messages` and records what was sent.
fn spawn_mock(status: StatusCode, reply: Value) -> (String, Captured) {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    listener.set_nonblocking(true).unwrap();
    let addr = listener.local_addr().unwrap();

    let captured: Captured = Arc::default();
    let seen = captured.clone();

    std::thread::spawn(move || {
        let runtime = tokio::runtime::Runtime::new().unwrap();
        runtime.block_on(async move {
            let app = Router::new().route(
                "/v1/messages",
                post(move |headers: HeaderMap, Json(body): Json<Value>| {
                    let seen = seen.clone();
                    let reply = reply.clone();
                    async move {
                        seen.lock().unwrap().push((headers, body));
                        (status, Json(reply))
                    }
                }),
            );
            let listener = tokio::net::TcpListener::from_std(listener).unwrap();
            axum::serve(listener, app).await.unwrap();
        });
    });

    (format!("http://{addr}/v1/messages"), captured)
}

fn message(text: &str) -> Value {
    json!({
        "id": "msg_test",
        "type": "message",
        "role": "assistant",
        "model": "claude-3-opus-20240229",
        "content": [{ "type": "text", "text": text }],
        "stop_reason": "end_turn",
    })
}

fn upload(format: ImageFormat) -> Vec<u8> {
    let mut bytes = Vec::new();
    DynamicImage::ImageRgb8(RgbImage::from_pixel(100, 100, BASE))
        .write_to(&mut Cursor::new(&mut bytes), format)
        .unwrap();
    bytes
}

fn client(endpoint: &str) -> AnthropicClient {
    AnthropicClient::new(ClientConfig::with_endpoint(endpoint)).unwrap()
}

fn request(format: ImageFormat) -> DetectionRequest {
    let decoded = codec::decode(&upload(format)).unwrap();
    DetectionRequest {
        image: codec::reencode(&decoded).unwrap(),
        label: "cat".to_string(),
        api_key: "sk-test".to_string(),
    }
}

#[test]
fn cat_is_boxed_in_yellow() {
    let (endpoint, captured) = spawn_mock(
        StatusCode::OK,
        message(
            r#"{"found": true, "coords": [0.1, 0.1, 0.5, 0.5], "confidence": 0.6, "description": "top-left"}"#,
        ),
    );

    let inputs = ShellInputs {
        api_key: "sk-test".to_string(),
        upload: Some(upload(ImageFormat::Png)),
        prompt: "cat".to_string(),
        threshold: 0.5,
    };
    let outcome = shell::run(&inputs, &mut client(&endpoint), &OverlayStyle::default());

    let ResultView::Annotated(annotated) = &outcome.view else {
        panic!("expected an annotated image");
    };
    let yellow = Rgba([255, 255, 0, 255]);
    let base = Rgba([BASE[0], BASE[1], BASE[2], 255]);
    assert_eq!(*annotated.get_pixel(50, 50), yellow);
    assert_eq!(*annotated.get_pixel(10, 30), yellow);
    assert_eq!(*annotated.get_pixel(50, 30), yellow);
    assert_eq!(*annotated.get_pixel(30, 50), yellow);
    assert_eq!(*annotated.get_pixel(9, 30), base);
    assert_eq!(*annotated.get_pixel(51, 30), base);
    assert_eq!(*annotated.get_pixel(30, 51), base);

    assert_eq!(outcome.notices.len(), 1);
    assert_eq!(outcome.notices[0].level, NoticeLevel::Success);
    assert_eq!(
        outcome.notices[0].message,
        "Detected 'cat' at top-left with 60.00% confidence."
    );

    let captured = captured.lock().unwrap();
    assert_eq!(captured.len(), 1);
    let (headers, body) = &captured[0];
    assert_eq!(headers["x-api-key"], "sk-test");
    assert_eq!(headers["anthropic-version"], "2023-06-01");
    assert_eq!(headers["content-type"], "application/json");

    let source = &body["messages"][0]["content"][1]["source"];
    assert_eq!(source["media_type"], "image/png");
    let sent = STANDARD.decode(source["data"].as_str().unwrap()).unwrap();
    assert_eq!(image::guess_format(&sent).unwrap(), ImageFormat::Png);
}

#[test]
fn jpeg_upload_is_declared_as_jpeg() {
    let (endpoint, captured) = spawn_mock(StatusCode::OK, message(r#"{"found": false}"#));

    let result = client(&endpoint).detect(request(ImageFormat::Jpeg)).unwrap();
    assert_eq!(result, DetectionResult::not_found());

    let captured = captured.lock().unwrap();
    let source = &captured[0].1["messages"][0]["content"][1]["source"];
    assert_eq!(source["media_type"], "image/jpeg");
}

#[test]
fn missing_content_is_not_found() {
    let (endpoint, _) = spawn_mock(StatusCode::OK, json!({ "id": "msg_test" }));

    let err = client(&endpoint)
        .detect(request(ImageFormat::Png))
        .unwrap_err();
    assert!(matches!(err, DetectError::MissingContent));

    let inputs = ShellInputs {
        api_key: "sk-test".to_string(),
        upload: Some(upload(ImageFormat::Png)),
        prompt: "cat".to_string(),
        threshold: 0.5,
    };
    let outcome = shell::run(&inputs, &mut client(&endpoint), &OverlayStyle::default());
    assert!(matches!(outcome.view, ResultView::Original(_)));
    assert_eq!(outcome.detection, Some(DetectionResult::not_found()));
    assert_eq!(outcome.notices[0].level, NoticeLevel::Error);
    assert_eq!(outcome.notices[1].level, NoticeLevel::Warning);
}

#[test]
fn garbled_model_text_is_malformed() {
    let (endpoint, _) = spawn_mock(
        StatusCode::OK,
        message("Sorry, I can't help with locating that."),
    );

    let err = client(&endpoint)
        .detect(request(ImageFormat::Png))
        .unwrap_err();
    assert!(matches!(err, DetectError::MalformedReply(_)));
}

#[test]
fn api_error_envelope_is_reported() {
    let (endpoint, _) = spawn_mock(
        StatusCode::UNAUTHORIZED,
        json!({
            "type": "error",
            "error": { "type": "authentication_error", "message": "invalid x-api-key" }
        }),
    );

    match client(&endpoint).detect(request(ImageFormat::Png)) {
        Err(DetectError::Api { kind, message }) => {
            assert_eq!(kind, "authentication_error");
            assert_eq!(message, "invalid x-api-key");
        }
        other => panic!("unexpected result: {other:?}"),
    }
}

#[test]
fn unreachable_endpoint_is_a_transport_error() {
    let addr = {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap()
    };

    let err = client(&format!("http://{addr}/v1/messages"))
        .detect(request(ImageFormat::Png))
        .unwrap_err();
    assert!(matches!(err, DetectError::Transport(_)));
}
