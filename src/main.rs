use actix_cors::Cors;
use actix_multipart::Multipart;
use actix_web::{middleware::Logger, web, App, Either, HttpResponse, HttpServer};
use serde::{Deserialize, Serialize};

mod config;
mod khqr;
mod qr;
mod response;
mod upload;

use config::{Config, UploadConfig};
use khqr::KhqrValidator;
use qr::QrService;
use response::{ApiError, ApiResponse};
use upload::{StoredUpload, UploadStore};

const BANNER: &str = "Polymer KHQR API";

#[derive(Debug, Deserialize)]
struct GenerateRequest {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Serialize)]
struct DecodeBody {
    data: String,
}

#[derive(Serialize)]
struct GenerateBody {
    qr: String,
}

// Главная страница API
async fn index() -> HttpResponse {
    HttpResponse::Ok()
        .content_type("text/plain; charset=utf-8")
        .body(BANNER)
}

// Распознать KHQR с загруженной картинки
async fn decode(
    uploads: web::Data<UploadStore>,
    qr_service: web::Data<QrService>,
    validator: web::Data<KhqrValidator>,
    payload: Multipart,
) -> Result<HttpResponse, ApiError> {
    let upload = uploads.receive(payload).await?;
    log::info!("Decoding upload: {} bytes of {}", upload.size(), upload.mime());

    let result = decode_upload(&upload, &qr_service, &validator).await;

    // Файл удаляется после того, как ответ определен
    drop(upload);
    result
}

async fn decode_upload(
    upload: &StoredUpload,
    qr_service: &QrService,
    validator: &KhqrValidator,
) -> Result<HttpResponse, ApiError> {
    let path = upload.path().to_path_buf();
    let qr_service = qr_service.clone();

    let decoded = web::block(move || qr_service.decode_file(&path))
        .await
        .map_err(|e| anyhow::anyhow!("Decode task failed: {}", e))?
        .map_err(|e| ApiError::ImageDecode(e.to_string()))?;

    let content = decoded.ok_or(ApiError::NoQrCode)?;

    let verification = validator.verify(&content);
    if !verification.is_valid {
        log::info!("Decoded QR is not KHQR: {}", verification.details);
        return Err(ApiError::InvalidKhqr);
    }

    log::info!("KHQR decoded successfully ({} chars)", content.len());
    Ok(ApiResponse::ok("QR code decoded successfully", DecodeBody { data: content }).into_http())
}

// Сгенерировать QR код из текста (JSON или form)
async fn generate(
    qr_service: web::Data<QrService>,
    req: Either<web::Json<GenerateRequest>, web::Form<GenerateRequest>>,
) -> Result<HttpResponse, ApiError> {
    let request = match req {
        Either::Left(json) => json.into_inner(),
        Either::Right(form) => form.into_inner(),
    };

    let text = match request.text {
        Some(text) if !text.trim().is_empty() => text,
        _ => return Err(ApiError::InvalidText),
    };

    let qr_service = qr_service.get_ref().clone();
    let qr = web::block(move || qr_service.generate_qr_code(&text))
        .await
        .map_err(|e| anyhow::anyhow!("Encode task failed: {}", e))?
        .map_err(|e| ApiError::QrEncode(e.to_string()))?;

    Ok(ApiResponse::ok("QR code generated successfully", GenerateBody { qr }).into_http())
}

async fn not_found() -> Result<HttpResponse, ApiError> {
    Err(ApiError::NotFound)
}

/// Маршруты и общие сервисы приложения
fn configure(upload_config: UploadConfig) -> impl FnOnce(&mut web::ServiceConfig) {
    move |cfg| {
        cfg.app_data(web::Data::new(UploadStore::new(upload_config)))
            .app_data(web::Data::new(QrService::new()))
            .app_data(web::Data::new(KhqrValidator::new()))
            // Нечитаемое тело = текста нет
            .app_data(web::JsonConfig::default().error_handler(|err, _req| {
                log::debug!("Rejected JSON body: {}", err);
                ApiError::InvalidText.into()
            }))
            .app_data(web::FormConfig::default().error_handler(|err, _req| {
                log::debug!("Rejected form body: {}", err);
                ApiError::InvalidText.into()
            }))
            .route("/", web::get().to(index))
            .route("/decode", web::post().to(decode))
            .route("/generate", web::post().to(generate))
            .default_service(web::to(not_found));
    }
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    // RUST_LOG может прийти из .env
    dotenv::dotenv().ok();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = Config::load().expect("Failed to load config");

    let host = config.server.host.clone();
    let port = config.server.port;
    let upload_config = config.upload.clone();

    log::info!("Starting KHQR server on http://{}:{}", host, port);
    log::info!(
        "Uploads: dir={}, limit={} bytes, types={}",
        upload_config.dir.display(),
        upload_config.max_file_size,
        upload_config.allowed_types.join(", ")
    );

    HttpServer::new(move || {
        let cors = Cors::default().allow_any_origin().allow_any_method().allow_any_header().max_age(3600);
        App::new()
            .wrap(cors)
            .wrap(Logger::default())
            .configure(configure(upload_config.clone()))
    })
        .bind((host.as_str(), port))?
        .run()
        .await
}
