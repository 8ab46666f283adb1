//! `POST /api/import-excel`: bulk import with a streamed progress response.
//!
//! The response is always `200 text/event-stream`; every failure, including a
//! missing file, is reported as an `error` event inside the stream.

use actix_multipart::Multipart;
use actix_web::http::header::{CACHE_CONTROL, CONTENT_TYPE};
use actix_web::{post, web, HttpRequest, HttpResponse};
use futures::{stream, Stream, StreamExt};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::{resolve_source_url, AppState};
use crate::services::import_pipeline::ChannelSink;
use crate::services::progress_stream::encode_event;
use crate::types::ImportEvent;

const NO_FILE_MESSAGE: &str = "Aucun fichier fourni";
const EVENT_BUFFER: usize = 32;

/// Fields read from the multipart upload
#[derive(Debug, Default)]
struct Upload {
    file: Option<(String, Vec<u8>)>,
    source_url: Option<String>,
}

async fn read_upload(mut payload: Multipart, max_bytes: usize) -> Result<Upload, String> {
    let mut upload = Upload::default();

    while let Some(field) = payload.next().await {
        let mut field = field.map_err(|e| format!("Requête multipart invalide: {}", e))?;
        let name = field.name().unwrap_or_default().to_string();
        let file_name = field
            .content_disposition()
            .and_then(|cd| cd.get_filename())
            .map(str::to_string);

        let mut bytes = Vec::new();
        while let Some(chunk) = field.next().await {
            let chunk = chunk.map_err(|e| format!("Requête multipart invalide: {}", e))?;
            if bytes.len() + chunk.len() > max_bytes {
                return Err(format!("Fichier trop volumineux (maximum {} octets)", max_bytes));
            }
            bytes.extend_from_slice(&chunk);
        }

        match name.as_str() {
            "file" => upload.file = Some((file_name.unwrap_or_else(|| "upload.xlsx".to_string()), bytes)),
            "sourceUrl" => upload.source_url = Some(String::from_utf8_lossy(&bytes).into_owned()),
            _ => {}
        }
    }

    Ok(upload)
}

fn event_stream<S>(body: S) -> HttpResponse
where
    S: Stream<Item = Result<web::Bytes, actix_web::Error>> + 'static,
{
    HttpResponse::Ok()
        .insert_header((CONTENT_TYPE, "text/event-stream"))
        .insert_header((CACHE_CONTROL, "no-cache"))
        .insert_header(("X-Accel-Buffering", "no"))
        .streaming(body)
}

fn single_event(event: ImportEvent) -> HttpResponse {
    let frame = web::Bytes::from(encode_event(&event));
    event_stream(stream::once(async move { Ok(frame) }))
}

#[post("/import-excel")]
pub async fn import_excel(state: web::Data<AppState>, req: HttpRequest, payload: Multipart) -> HttpResponse {
    let upload = match read_upload(payload, state.max_upload_bytes).await {
        Ok(upload) => upload,
        Err(message) => {
            warn!("Import upload rejected: {}", message);
            return single_event(ImportEvent::Error { message });
        }
    };

    let Some((file_name, bytes)) = upload.file else {
        return single_event(ImportEvent::Error {
            message: NO_FILE_MESSAGE.to_string(),
        });
    };

    let source_url = resolve_source_url(upload.source_url.as_deref(), &req, &state.default_source_url);
    info!(file = %file_name, size = bytes.len(), source_url = %source_url, "Import upload received");

    let (tx, rx) = mpsc::channel::<ImportEvent>(EVENT_BUFFER);
    let cancel = CancellationToken::new();
    // Dropped with the response body, i.e. when the client goes away
    let guard = cancel.clone().drop_guard();

    let pipeline = state.pipeline.clone();
    actix_web::rt::spawn(async move {
        let mut sink = ChannelSink::new(tx);
        pipeline
            .run_upload(bytes, file_name, &source_url, &mut sink, &cancel)
            .await;
    });

    let body = stream::unfold((rx, guard), |(mut rx, guard)| async move {
        let event = rx.recv().await?;
        let frame = web::Bytes::from(encode_event(&event));
        Some((Ok::<_, actix_web::Error>(frame), (rx, guard)))
    });

    event_stream(body)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use crate::config::ImportSettings;
    use crate::handlers::test_support::Fakes;
    use crate::services::progress_stream::{ProgressDecoder, ProgressTally};
    use crate::types::{ImportRunStats, RowStatus};
    use actix_web::{test, App};

    const BOUNDARY: &str = "facadeleadsboundary";

    fn multipart(parts: &[(&str, Option<&str>, &[u8])]) -> Vec<u8> {
        let mut body = Vec::new();
        for (name, file_name, content) in parts {
            body.extend_from_slice(format!("--{}\r\n", BOUNDARY).as_bytes());
            match file_name {
                Some(file_name) => body.extend_from_slice(
                    format!(
                        "Content-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\nContent-Type: application/octet-stream\r\n\r\n",
                        name, file_name
                    )
                    .as_bytes(),
                ),
                None => body.extend_from_slice(
                    format!("Content-Disposition: form-data; name=\"{}\"\r\n\r\n", name).as_bytes(),
                ),
            }
            body.extend_from_slice(content);
            body.extend_from_slice(b"\r\n");
        }
        body.extend_from_slice(format!("--{}--\r\n", BOUNDARY).as_bytes());
        body
    }

    async fn post(fakes: &Fakes, body: Vec<u8>) -> (String, Vec<ImportEvent>) {
        let app = test::init_service(App::new().app_data(fakes.state()).configure(crate::handlers::configure)).await;
        let req = test::TestRequest::post()
            .uri("/api/import-excel")
            .insert_header((CONTENT_TYPE, format!("multipart/form-data; boundary={}", BOUNDARY)))
            .set_payload(body)
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), 200);
        let content_type = resp
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();

        let bytes = test::read_body(resp).await;
        let mut decoder = ProgressDecoder::new();
        (content_type, decoder.push(&bytes))
    }

    #[actix_web::test]
    async fn missing_file_yields_single_error_event() {
        let fakes = Fakes::new();
        let body = multipart(&[("sourceUrl", None, "https://lp.example.fr".as_bytes())]);
        let (content_type, events) = post(&fakes, body).await;

        assert_eq!(content_type, "text/event-stream");
        assert_eq!(
            events,
            vec![ImportEvent::Error {
                message: NO_FILE_MESSAGE.into()
            }]
        );
        assert!(fakes.crm.calls().is_empty());
    }

    #[actix_web::test]
    async fn csv_upload_streams_rows_and_summary() {
        let fakes = Fakes::new();
        let csv = "Nom,Prénom,Email,Marketing\nDurand,Alice,alice@example.fr,non\n,Bruno,bruno@example.fr,oui\n";
        let body = multipart(&[
            ("file", Some("contacts.csv"), csv.as_bytes()),
            ("sourceUrl", None, "https://lp.example.fr/".as_bytes()),
        ]);
        let (_, events) = post(&fakes, body).await;

        let mut tally = ProgressTally::default();
        events.iter().for_each(|e| tally.apply(e));
        assert_eq!(events.len(), 5);
        assert_eq!(
            tally.final_stats,
            Some(ImportRunStats { total: 2, processed: 2, success: 1, failed: 1, marketing: 0 })
        );
        assert_eq!(tally.results[1].status, RowStatus::Error);

        let saved = fakes.crm.contact("alice@example.fr").unwrap();
        assert_eq!(saved.attributes["SOURCE"], "https://lp.example.fr/");
        assert_eq!(saved.list_ids, vec![3]);
    }

    #[actix_web::test]
    async fn dropping_the_response_stops_the_run() {
        use actix_web::body::MessageBody;

        let fakes = Fakes::new();
        let pacing = ImportSettings {
            echo_delay: Duration::ZERO,
            row_delay: Duration::from_millis(50),
        };
        let app = test::init_service(
            App::new()
                .app_data(fakes.state_with_pacing(pacing))
                .configure(crate::handlers::configure),
        )
        .await;

        let mut csv = String::from("Nom,Prénom,Email\n");
        for i in 0..10 {
            csv.push_str(&format!("Martin,Paul,paul{}@example.fr\n", i));
        }
        let req = test::TestRequest::post()
            .uri("/api/import-excel")
            .insert_header((CONTENT_TYPE, format!("multipart/form-data; boundary={}", BOUNDARY)))
            .set_payload(multipart(&[("file", Some("contacts.csv"), csv.as_bytes())]))
            .to_request();
        let resp = test::call_service(&app, req).await;

        let mut body = Box::pin(resp.into_body());
        let first = std::future::poll_fn(|cx| body.as_mut().poll_next(cx)).await;
        assert!(matches!(first, Some(Ok(_))));
        drop(body);

        tokio::time::sleep(Duration::from_millis(400)).await;
        assert!(fakes.crm.calls().len() <= 1);
    }

    #[actix_web::test]
    async fn unreadable_file_yields_error_event() {
        let fakes = Fakes::new();
        let body = multipart(&[("file", Some("contacts.xlsx"), "definitely not a workbook".as_bytes())]);
        let (_, events) = post(&fakes, body).await;

        assert_eq!(events.len(), 1);
        assert!(matches!(&events[0], ImportEvent::Error { .. }));
    }
}
