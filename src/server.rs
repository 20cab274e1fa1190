use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use actix_files::Files;
use actix_multipart::Multipart;
use actix_web::{get, post, web, App, HttpResponse, HttpServer};
use futures_util::StreamExt;
use image::ImageOutputFormat;
use thiserror::Error;
use tracing::{error, info, warn};

use crate::classifier::{
    argmax, clip, Category, ClassificationError, ClipClassifier, ImageClassifier, MockClassifier,
    LABELS,
};
use crate::config::AppConfig;
use crate::io_struct::{ErrorDetail, FileClassification, PredictResponse, UploadAck};
use crate::logging::{self, LoggingConfig};
use crate::storage::{insert_image, Store};

const INDEX_TEMPLATE: &str = include_str!("../static/index.html");

/// Shared per-process state. The classifier is loaded once and read-only;
/// database connections are opened per request, never stored here.
pub struct AppState {
    pub classifier: Arc<dyn ImageClassifier>,
    pub db_path: PathBuf,
    pub max_payload_size: usize,
}

/// One fully buffered upload from a multipart batch.
pub struct UploadedFile {
    pub file_name: String,
    pub data: Vec<u8>,
}

/// Failures while reading the multipart body, before any classification.
#[derive(Debug, Error)]
pub enum UploadError {
    #[error("failed to read upload: {0}")]
    Multipart(String),

    #[error("file '{file_name}' exceeds the {limit} byte payload limit")]
    FileTooLarge { file_name: String, limit: usize },
}

/// Failures on the classify-and-persist path. All variants map uniformly
/// to a 500 with the error message as `detail`; the taxonomy exists for
/// logs, not for the client.
#[derive(Debug, Error)]
pub enum PredictError {
    #[error("failed to decode image: {0}")]
    Decode(#[from] image::ImageError),

    #[error("classification failed: {0}")]
    Classification(#[from] ClassificationError),

    #[error("failed to persist record: {0}")]
    Persistence(#[from] rusqlite::Error),
}

/// Classify every file in submission order and persist the results.
///
/// The whole batch runs inside one SQLite transaction: either every file
/// classifies and commits together, or the first failure rolls back all
/// rows and surfaces the error. Rows returned to the caller and rows in
/// the store therefore always agree.
pub fn classify_batch(
    classifier: &dyn ImageClassifier,
    db_path: &Path,
    files: &[UploadedFile],
) -> Result<Vec<FileClassification>, PredictError> {
    let mut store = Store::open(db_path)?;
    let tx = store.transaction()?;

    let mut results = Vec::with_capacity(files.len());
    for file in files {
        let decoded = image::load_from_memory(&file.data)?;

        // Canonical lossless re-encode: stored bytes are PNG no matter
        // what encoding the client uploaded.
        let mut png = Vec::new();
        decoded.write_to(&mut Cursor::new(&mut png), ImageOutputFormat::Png)?;

        let probs = classifier.classify(&decoded, &LABELS)?;
        let idx = argmax(&probs);
        let category = Category::from_index(idx).ok_or_else(|| {
            ClassificationError::BadOutput(format!("label index {idx} out of range"))
        })?;

        insert_image(&tx, &png, category.as_str(), &file.file_name)?;
        info!("classified '{}' as {}", file.file_name, category.as_str());

        results.push(FileClassification {
            file_name: file.file_name.clone(),
            probs: vec![probs],
        });
    }

    tx.commit()?;
    Ok(results)
}

/// Buffer every `files` part of the multipart body into memory, enforcing
/// the per-file payload limit. Parts with any other name are drained and
/// ignored.
async fn read_upload_batch(
    mut payload: Multipart,
    limit: usize,
) -> Result<Vec<UploadedFile>, UploadError> {
    let mut files = Vec::new();

    while let Some(item) = payload.next().await {
        let mut field = item.map_err(|e| UploadError::Multipart(e.to_string()))?;
        if field.name() != "files" {
            while let Some(chunk) = field.next().await {
                chunk.map_err(|e| UploadError::Multipart(e.to_string()))?;
            }
            continue;
        }

        let file_name = field
            .content_disposition()
            .get_filename()
            .unwrap_or("upload")
            .to_string();

        let mut data = Vec::new();
        while let Some(chunk) = field.next().await {
            let chunk = chunk.map_err(|e| UploadError::Multipart(e.to_string()))?;
            if data.len() + chunk.len() > limit {
                return Err(UploadError::FileTooLarge { file_name, limit });
            }
            data.extend_from_slice(&chunk);
        }

        files.push(UploadedFile { file_name, data });
    }

    Ok(files)
}

#[get("/")]
async fn index() -> HttpResponse {
    // Template substitution only, no business logic
    let page = INDEX_TEMPLATE.replace("{{version}}", env!("CARGO_PKG_VERSION"));
    HttpResponse::Ok()
        .content_type("text/html; charset=utf-8")
        .body(page)
}

#[get("/health")]
async fn health() -> HttpResponse {
    HttpResponse::Ok().body("Ok")
}

#[post("/predict")]
async fn predict(payload: Multipart, data: web::Data<AppState>) -> HttpResponse {
    let files = match read_upload_batch(payload, data.max_payload_size).await {
        Ok(files) => files,
        Err(e @ UploadError::FileTooLarge { .. }) => {
            warn!("rejecting oversized upload: {e}");
            return HttpResponse::PayloadTooLarge().json(ErrorDetail {
                detail: e.to_string(),
            });
        }
        Err(e) => {
            error!("failed to read multipart body: {e}");
            return HttpResponse::InternalServerError().json(ErrorDetail {
                detail: e.to_string(),
            });
        }
    };

    // Decode, inference and DB writes are all blocking work
    let classifier = Arc::clone(&data.classifier);
    let db_path = data.db_path.clone();
    match web::block(move || classify_batch(classifier.as_ref(), &db_path, &files)).await {
        Ok(Ok(results)) => HttpResponse::Ok().json(PredictResponse { results }),
        Ok(Err(e)) => {
            error!("predict batch failed: {e}");
            HttpResponse::InternalServerError().json(ErrorDetail {
                detail: e.to_string(),
            })
        }
        Err(e) => {
            error!("blocking worker failed: {e}");
            HttpResponse::InternalServerError().json(ErrorDetail {
                detail: e.to_string(),
            })
        }
    }
}

/// Accepts files and acknowledges them without classifying or persisting
/// anything. Kept for interface completeness.
#[post("/upload_files")]
async fn upload_files(mut payload: web::Payload) -> HttpResponse {
    while let Some(chunk) = payload.next().await {
        if let Err(e) = chunk {
            warn!("error while draining upload payload: {e}");
            break;
        }
    }
    HttpResponse::Ok().json(UploadAck {
        message: "Files uploaded successfully.".to_string(),
    })
}

/// Register the service routes. Split out from `startup` so the test
/// harness can mount the same routes on an in-memory app.
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(index)
        .service(health)
        .service(predict)
        .service(upload_files);
}

fn to_io_err<E: std::fmt::Display>(e: E) -> std::io::Error {
    std::io::Error::new(std::io::ErrorKind::Other, e.to_string())
}

pub async fn startup(config: AppConfig) -> std::io::Result<()> {
    let _log_guard = logging::init_logging(LoggingConfig {
        level: logging::parse_level(config.log_level.as_deref()),
        json_format: false,
        log_dir: config.log_dir.clone(),
        colorize: true,
    });

    info!("Initializing categoreyes on {}:{}", config.host, config.port);
    info!(
        "Max payload size: {} MB",
        config.max_payload_size / (1024 * 1024)
    );

    let classifier: Arc<dyn ImageClassifier> = if config.mock_model {
        warn!("Running with the mock classifier; predictions are placeholders");
        Arc::new(MockClassifier)
    } else {
        clip::init_runtime().map_err(to_io_err)?;
        Arc::new(ClipClassifier::load(&config.model_dir).map_err(to_io_err)?)
    };

    // Create the schema up front so the first request finds it in place
    Store::open(&config.db_path).map_err(to_io_err)?;
    info!("Database ready at {}", config.db_path.display());

    let state = web::Data::new(AppState {
        classifier,
        db_path: config.db_path.clone(),
        max_payload_size: config.max_payload_size,
    });
    let static_dir = config.static_dir.clone();

    info!("Serving on {}:{}", config.host, config.port);
    HttpServer::new(move || {
        App::new()
            .app_data(state.clone())
            .configure(configure)
            .service(Files::new("/img", static_dir.join("img")))
            .service(Files::new("/static", static_dir.clone()))
    })
    .bind((config.host.as_str(), config.port))?
    .run()
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};

    fn png_bytes(w: u32, h: u32, color: [u8; 3]) -> Vec<u8> {
        let img = image::DynamicImage::ImageRgb8(RgbImage::from_pixel(w, h, Rgb(color)));
        let mut buf = Vec::new();
        img.write_to(&mut Cursor::new(&mut buf), ImageOutputFormat::Png)
            .unwrap();
        buf
    }

    fn temp_db() -> (tempfile::TempDir, PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test.db");
        (dir, path)
    }

    #[test]
    fn batch_classifies_and_persists_in_order() {
        let (_dir, db_path) = temp_db();
        let files = vec![
            UploadedFile {
                file_name: "red.png".to_string(),
                data: png_bytes(8, 8, [255, 0, 0]),
            },
            UploadedFile {
                file_name: "green.png".to_string(),
                data: png_bytes(8, 8, [0, 255, 0]),
            },
        ];

        let results = classify_batch(&MockClassifier, &db_path, &files).unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].file_name, "red.png");
        assert_eq!(results[1].file_name, "green.png");

        for result in &results {
            assert_eq!(result.probs.len(), 1);
            assert_eq!(result.probs[0].len(), LABELS.len());
            assert!((result.probs[0].iter().sum::<f32>() - 1.0).abs() < 1e-5);
        }

        let store = Store::open(&db_path).unwrap();
        let records = store.list().unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].filename, "red.png");
        // Stored category matches the arg-max of the returned vector
        let expected = LABELS[argmax(&results[0].probs[0])];
        assert_eq!(records[0].category, expected);
    }

    #[test]
    fn corrupt_file_rolls_back_whole_batch() {
        let (_dir, db_path) = temp_db();
        let files = vec![
            UploadedFile {
                file_name: "ok.png".to_string(),
                data: png_bytes(8, 8, [10, 20, 30]),
            },
            UploadedFile {
                file_name: "broken.png".to_string(),
                data: b"definitely not an image".to_vec(),
            },
        ];

        let err = classify_batch(&MockClassifier, &db_path, &files).unwrap_err();
        assert!(matches!(err, PredictError::Decode(_)));

        // The valid file before the corrupt one is rolled back too
        let store = Store::open(&db_path).unwrap();
        assert_eq!(store.count().unwrap(), 0);
    }

    #[test]
    fn stored_bytes_are_png_with_original_dimensions() {
        let (_dir, db_path) = temp_db();
        // Upload a JPEG; storage must hold a PNG of the same dimensions
        let img = image::DynamicImage::ImageRgb8(RgbImage::from_pixel(20, 10, Rgb([200, 100, 50])));
        let mut jpeg = Vec::new();
        img.write_to(&mut Cursor::new(&mut jpeg), ImageOutputFormat::Jpeg(90))
            .unwrap();

        classify_batch(
            &MockClassifier,
            &db_path,
            &[UploadedFile {
                file_name: "photo.jpg".to_string(),
                data: jpeg,
            }],
        )
        .unwrap();

        let store = Store::open(&db_path).unwrap();
        let records = store.list().unwrap();
        assert_eq!(records.len(), 1);
        assert!(!records[0].data.is_empty());
        let stored = image::load_from_memory(&records[0].data).unwrap();
        assert_eq!(image::guess_format(&records[0].data).unwrap(), image::ImageFormat::Png);
        assert_eq!(stored.width(), 20);
        assert_eq!(stored.height(), 10);
    }

    #[test]
    fn same_image_twice_creates_independent_records() {
        let (_dir, db_path) = temp_db();
        let upload = |db: &Path| {
            classify_batch(
                &MockClassifier,
                db,
                &[UploadedFile {
                    file_name: "dup.png".to_string(),
                    data: png_bytes(8, 8, [1, 2, 3]),
                }],
            )
            .unwrap()
        };

        upload(&db_path);
        upload(&db_path);

        let store = Store::open(&db_path).unwrap();
        let records = store.list().unwrap();
        assert_eq!(records.len(), 2);
        assert_ne!(records[0].id, records[1].id);
        assert_eq!(records[0].category, records[1].category);
    }

    #[test]
    fn empty_batch_produces_empty_results() {
        let (_dir, db_path) = temp_db();
        let results = classify_batch(&MockClassifier, &db_path, &[]).unwrap();
        assert!(results.is_empty());
    }
}
