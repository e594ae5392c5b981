use std::path::PathBuf;

use clap::Parser;
use face_scan_session::channel::{ConnectParams, UserProfile};
use face_scan_session::config::Config;
use face_scan_session::logging::{init_tracing, LogConfig};
use face_scan_session::replay::{load_trace, scripted};
use face_scan_session::session::{LogSink, ResultSink, SessionController, SessionUpdate};
use face_scan_session::submit::{wait_for_receipt, FormSink, FormSubmitter, SubmissionReceipt};
use futures::StreamExt;

#[derive(Parser, Debug)]
#[command(
    name = "face-scan-session",
    version,
    about = "Replay a recorded face-scan trace through a scan session"
)]
struct Args {
    /// JSON-lines trace of tracker frames and channel messages
    #[arg(long)]
    trace: PathBuf,

    /// Guide message language (overrides SCAN_LANGUAGE)
    #[arg(long)]
    language: Option<String>,

    /// Form endpoint receiving the result (overrides SUBMIT_FORM_URL)
    #[arg(long)]
    submit_url: Option<String>,

    #[arg(long, default_value = "unspecified")]
    sex: String,

    #[arg(long, default_value_t = 0)]
    age: u32,

    /// Weight in kg
    #[arg(long, default_value_t = 0.0)]
    weight: f64,

    /// Height in cm
    #[arg(long, default_value_t = 0.0)]
    height: f64,
}

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    let args = Args::parse();

    let mut config = Config::from_env();
    init_tracing(&LogConfig::from(&config));
    tracing::info!(trace = %args.trace.display(), "Starting face-scan-session replay");

    if let Some(language) = args.language {
        config.scan.language = language;
    }
    if let Some(url) = args.submit_url {
        config.submit.form_url = Some(url);
    }

    let records = match load_trace(&args.trace).await {
        Ok(records) => records,
        Err(e) => {
            tracing::error!(error = %e, "Failed to load trace");
            std::process::exit(2);
        }
    };
    let (source, channel) = scripted(records);

    let profile = UserProfile {
        sex: args.sex,
        age: args.age,
        weight_kg: args.weight,
        height_cm: args.height,
    };
    let params = ConnectParams::from_config(&config.socket, profile);

    let (sink, receipt): (Box<dyn ResultSink>, Option<SubmissionReceipt>) =
        match FormSubmitter::from_config(&config.submit) {
            Some(submitter) => {
                tracing::info!(url = submitter.url(), "Form submission enabled");
                let (sink, receipt) = FormSink::new(submitter);
                (Box::new(sink), Some(receipt))
            }
            None => (Box::new(LogSink), None),
        };

    let controller = match SessionController::new(
        config.scan.clone(),
        params,
        Box::new(source),
        Box::new(channel),
        sink,
    ) {
        Ok(controller) => controller,
        Err(e) => {
            tracing::error!(error = %e, "Invalid scan configuration");
            std::process::exit(2);
        }
    };

    let handle = controller.handle();
    let updates = handle.updates();
    let logger = tokio::spawn(async move {
        futures::pin_mut!(updates);
        while let Some(update) = updates.next().await {
            let stopped = update == SessionUpdate::Stopped;
            log_update(&update);
            if stopped {
                break;
            }
        }
    });

    let stop_handle = handle.clone();
    let signal_task = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Shutdown signal received");
            stop_handle.stop();
        }
    });

    let outcome = controller.run().await;
    signal_task.abort();
    if let Err(e) = logger.await {
        tracing::warn!(error = %e, "Update logger ended abnormally");
    }

    if let Some(receipt) = receipt {
        if let Err(e) = wait_for_receipt(receipt).await {
            tracing::error!(error = %e, "Result was not delivered to the form endpoint");
        }
    }

    match serde_json::to_string_pretty(&outcome.result) {
        Ok(json) => println!("{json}"),
        Err(e) => tracing::error!(error = %e, "Failed to encode result"),
    }

    tracing::info!(
        session_id = %outcome.session_id,
        state = %outcome.state,
        average_fps = outcome.fps.average,
        "Replay finished"
    );
    if let Some(error) = outcome.error {
        tracing::error!(error = %error, "Session ended with error");
        if error.is_fatal() {
            std::process::exit(1);
        }
    }
}

fn log_update(update: &SessionUpdate) {
    match update {
        SessionUpdate::Guide(view) => tracing::info!(
            halo = view.halo.code(),
            text = %view.message.text,
            context = %view.message.context,
            blocked = view.is_blocked,
            "Guide"
        ),
        SessionUpdate::Progress {
            percent,
            elapsed_secs,
            signal_quality,
        } => tracing::info!(percent, elapsed_secs, signal_quality = ?signal_quality, "Progress"),
        SessionUpdate::MetricUpdated { kind, value } => {
            tracing::info!(metric = kind.as_str(), value, "Metric")
        }
        SessionUpdate::Warning(kind) => tracing::warn!(warning = %kind, "Channel warning"),
        SessionUpdate::DeviceUnsupported(fps) => {
            tracing::warn!(average = fps.average, max = fps.max, "Device unsupported")
        }
        other => match serde_json::to_string(other) {
            Ok(json) => tracing::debug!(update = %json, "Session update"),
            Err(e) => tracing::debug!(error = %e, "Unencodable session update"),
        },
    }
}
