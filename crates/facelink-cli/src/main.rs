use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use facelink_hw::frame::UPLOAD_JPEG_QUALITY;
use facelink_hw::{Camera, Frame};
use facelink_remote::{
    run_enrollment, EnrollmentPlan, EnrollmentTally, RecognitionClient, DEFAULT_API_URL,
};
use std::path::{Path, PathBuf};
use std::time::Duration;

#[zbus::proxy(
    interface = "org.freedesktop.FaceLink1",
    default_service = "org.freedesktop.FaceLink1",
    default_path = "/org/freedesktop/FaceLink1"
)]
trait FaceLink {
    async fn click(
        &self,
        x: f64,
        y: f64,
        display_width: f64,
        display_height: f64,
    ) -> zbus::Result<String>;
    async fn status(&self) -> zbus::Result<String>;
    async fn snapshot(&self, path: &str) -> zbus::Result<bool>;
}

#[derive(Parser)]
#[command(name = "facelink", about = "FaceLink live face-overlay CLI")]
struct Cli {
    /// Recognition backend base URL
    #[arg(long, env = "FACELINK_API_URL", default_value = DEFAULT_API_URL, global = true)]
    api_url: String,

    /// Per-request timeout in seconds
    #[arg(long, env = "FACELINK_REQUEST_TIMEOUT_SECS", default_value_t = 10, global = true)]
    timeout_secs: u64,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Capture and register face images for an identity
    Enroll {
        /// Identity id to register the images under
        #[arg(long)]
        id: String,
        /// V4L2 device to capture from
        #[arg(long, env = "FACELINK_CAMERA_DEVICE", default_value = "/dev/video0")]
        device: String,
        /// Number of images to capture
        #[arg(long, default_value_t = 5)]
        count: usize,
        /// Milliseconds between captures
        #[arg(long, default_value_t = 1500)]
        interval_ms: u64,
    },
    /// Show the faces the backend has registered for an identity
    Registered {
        /// Identity id
        id: String,
    },
    /// Run recognition on a still image
    Recognize {
        /// Image file (any format the image crate decodes)
        file: PathBuf,
    },
    /// Send a pointer press to the running daemon
    Click {
        x: f64,
        y: f64,
        #[arg(long)]
        display_width: f64,
        #[arg(long)]
        display_height: f64,
    },
    /// Show daemon status
    Status,
    /// Save the daemon's current overlay to an image file
    Snapshot {
        path: PathBuf,
    },
    /// List V4L2 capture devices
    Devices,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let timeout = Duration::from_secs(cli.timeout_secs);

    match cli.command {
        Commands::Enroll {
            id,
            device,
            count,
            interval_ms,
        } => {
            let client = RecognitionClient::new(cli.api_url, timeout)?;
            let camera = Camera::open(&device, 640, 480)
                .with_context(|| format!("failed to open {device} (is facelinkd using it?)"))?;
            let plan = EnrollmentPlan {
                total: count,
                interval: Duration::from_millis(interval_ms),
            };

            tracing::info!(id = %id, device = %device, count, interval_ms, "enrollment started");
            println!("Enrolling {id}: {count} captures, {interval_ms} ms apart. Look at the camera.");
            let tally = run_enrollment(
                &client,
                &id,
                plan,
                |_| tokio::task::block_in_place(|| capture_jpeg(&camera)),
                |tally| println!("  {}", progress_bar(tally)),
            )
            .await;

            println!(
                "{} of {} images registered ({} needed)",
                tally.succeeded,
                tally.total,
                tally.required()
            );
            if !tally.is_accepted() {
                anyhow::bail!("enrollment rejected: too few images registered");
            }
            println!("Enrollment accepted");
        }
        Commands::Registered { id } => {
            let client = RecognitionClient::new(cli.api_url, timeout)?;
            let faces = client.registered_faces(&id).await?;
            println!("{}", serde_json::to_string_pretty(&faces)?);
        }
        Commands::Recognize { file } => {
            let client = RecognitionClient::new(cli.api_url, timeout)?;
            let jpeg = load_jpeg(&file)?;
            let records = client.recognize(jpeg).await?;
            println!("{}", serde_json::to_string_pretty(&records)?);
        }
        Commands::Click {
            x,
            y,
            display_width,
            display_height,
        } => {
            let proxy = daemon().await?;
            let opened = proxy.click(x, y, display_width, display_height).await?;
            if opened.is_empty() {
                println!("No recognized face at ({x}, {y})");
            } else {
                println!("Opened profile: {opened}");
            }
        }
        Commands::Status => {
            let proxy = daemon().await?;
            let status = proxy.status().await?;
            let value: serde_json::Value = serde_json::from_str(&status)?;
            println!("{}", serde_json::to_string_pretty(&value)?);
        }
        Commands::Snapshot { path } => {
            // The daemon resolves paths against its own working directory.
            let path = if path.is_absolute() {
                path
            } else {
                std::env::current_dir()?.join(path)
            };
            let proxy = daemon().await?;
            if proxy.snapshot(&path.to_string_lossy()).await? {
                println!("Snapshot written to {}", path.display());
            } else {
                println!("Nothing rendered yet");
            }
        }
        Commands::Devices => {
            let devices = Camera::list_devices();
            if devices.is_empty() {
                println!("No V4L2 capture devices found");
            }
            for dev in devices {
                println!("{}\t{}\t{}\t{}", dev.path, dev.name, dev.driver, dev.bus);
            }
        }
    }

    Ok(())
}

async fn daemon() -> Result<FaceLinkProxy<'static>> {
    let conn = zbus::Connection::session().await?;
    tracing::debug!(service = "org.freedesktop.FaceLink1", "connected to session bus");
    FaceLinkProxy::new(&conn)
        .await
        .context("failed to reach facelinkd on the session bus")
}

fn capture_jpeg(camera: &Camera) -> Result<Vec<u8>> {
    let frame = camera.capture_frame()?;
    tracing::debug!(
        seq = frame.sequence,
        width = frame.width,
        height = frame.height,
        "enrollment frame captured"
    );
    Ok(frame.encode_jpeg(UPLOAD_JPEG_QUALITY)?)
}

/// One-line enrollment progress, e.g. `[####------]  40%  2 ok / 0 failed`.
fn progress_bar(tally: &EnrollmentTally) -> String {
    const WIDTH: usize = 20;
    let progress = tally.progress().clamp(0.0, 1.0);
    let filled = (progress * WIDTH as f32).round() as usize;
    format!(
        "[{}{}] {:>3.0}%  {} ok / {} failed",
        "#".repeat(filled),
        "-".repeat(WIDTH - filled),
        progress * 100.0,
        tally.succeeded,
        tally.failed
    )
}

fn load_jpeg(path: &Path) -> Result<Vec<u8>> {
    let image = image::open(path).with_context(|| format!("failed to read {}", path.display()))?;
    Ok(Frame::from_gray(image.to_luma8()).encode_jpeg(UPLOAD_JPEG_QUALITY)?)
}
