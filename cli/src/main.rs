mod logging;

use std::{path::PathBuf, sync::Arc};

use clap::{Parser, Subcommand};
use cloud_storage::{CloudStorageOps, FileSystemCloudStorage, S3CloudStorage, S3Config};
use core_types::{DeletionState, Diary, DiaryUpdate};
use local_cache::{FileLocalCache, LocalCache};
use service::{
    app_services::{AppServices, create_app_services},
    diary_collection::controller::CoverImage,
    settings::Settings,
};

#[derive(Parser, Debug)]
#[command(name = "diary-cli", about = "Manage video diaries")]
struct Cli {
    /// Signed-in user
    #[arg(long, env = "DIARY_USER")]
    user: String,

    /// S3 bucket for covers and videos. Without it blobs are kept on disk
    #[arg(long, env = "DIARY_S3_BUCKET")]
    s3_bucket: Option<String>,

    #[arg(long, env = "DIARY_S3_REGION", default_value = "us-east-1")]
    s3_region: String,

    /// Custom endpoint for S3 compatible services
    #[arg(long, env = "DIARY_S3_ENDPOINT", default_value = "")]
    s3_endpoint: String,

    /// Root of the directory-backed blob store
    #[arg(long, env = "DIARY_BLOB_DIR")]
    blob_dir: Option<PathBuf>,

    /// Directory of the local snapshot cache
    #[arg(long, env = "DIARY_CACHE_DIR")]
    cache_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List the user's diaries
    List,
    Create {
        title: String,
        #[arg(long, default_value = "")]
        description: String,
        /// Image file used as cover
        #[arg(long)]
        cover: Option<PathBuf>,
        #[arg(long)]
        private: bool,
    },
    Update {
        diary_id: String,
        #[arg(long)]
        title: Option<String>,
        #[arg(long)]
        description: Option<String>,
        #[arg(long)]
        cover: Option<PathBuf>,
        #[arg(long)]
        private: Option<bool>,
    },
    /// Delete a diary. Returns once it is hidden unless --wait is given
    Delete {
        diary_id: String,
        /// Wait until videos, blobs and the document are gone
        #[arg(long)]
        wait: bool,
    },
    /// Restore the most recently deleted diary
    Undo,
    AddVideo {
        diary_id: String,
        video_url: String,
        #[arg(long, default_value_t = 0.0)]
        duration: f64,
    },
}

fn print_diary(diary: &Diary) {
    println!(
        "{}\t{}\t{} videos{}",
        diary.id,
        diary.title,
        diary.video_count,
        if diary.is_private { "\tprivate" } else { "" }
    );
}

async fn read_cover(path: Option<PathBuf>) -> Result<Option<CoverImage>, Box<dyn std::error::Error>> {
    match path {
        Some(path) => Ok(Some(CoverImage {
            bytes: async_std::fs::read(path).await?,
        })),
        None => Ok(None),
    }
}

fn build_blob_store(args: &Cli) -> Result<Arc<dyn CloudStorageOps>, Box<dyn std::error::Error>> {
    if let Some(bucket) = &args.s3_bucket {
        let config = S3Config {
            bucket: bucket.clone(),
            region: args.s3_region.clone(),
            endpoint: args.s3_endpoint.clone(),
        };
        return Ok(Arc::new(S3CloudStorage::connect(&config)?));
    }
    let root = match &args.blob_dir {
        Some(dir) => dir.clone(),
        None => file_system::get_blob_root_dir()?,
    };
    Ok(Arc::new(FileSystemCloudStorage::new(root)))
}

fn build_local_cache(args: &Cli) -> Result<Arc<dyn LocalCache>, Box<dyn std::error::Error>> {
    let dir = match &args.cache_dir {
        Some(dir) => dir.clone(),
        None => file_system::get_local_cache_dir()?,
    };
    Ok(Arc::new(FileLocalCache::new(dir)?))
}

async fn run(args: Cli, services: Arc<AppServices>) -> Result<(), Box<dyn std::error::Error>> {
    let controller = services.diary_collection();
    controller.load(&args.user).await?;
    if let Some(error) = controller.error() {
        eprintln!("{}", error);
    }

    match args.command {
        Command::List => {
            for diary in controller.diaries() {
                print_diary(&diary);
            }
            if let Some(diary) = controller.last_deleted_diary() {
                println!("Last deleted: {} ({}), restore with `undo`", diary.title, diary.id);
            }
        }
        Command::Create {
            title,
            description,
            cover,
            private,
        } => {
            let cover = read_cover(cover).await?;
            let diary = controller
                .create(&title, &description, cover, private)
                .await?;
            print_diary(&diary);
        }
        Command::Update {
            diary_id,
            title,
            description,
            cover,
            private,
        } => {
            let update = DiaryUpdate {
                title,
                description,
                cover_image_url: None,
                is_private: private,
            };
            let cover = read_cover(cover).await?;
            controller.update(&diary_id, update, cover).await?;
        }
        Command::Delete { diary_id, wait } => {
            let Some(job_id) = controller.delete(&diary_id).await? else {
                println!("Deleted {} from local storage", diary_id);
                return Ok(());
            };
            let deletion = services.diary_deletion();
            let Some(updates) = deletion.subscribe(&job_id) else {
                return Ok(());
            };
            // The job dies with the process, so wait at least until the
            // diary is hidden for every reader
            while let Ok(job) = updates.recv_async().await {
                let hidden = job.state != DeletionState::Pending;
                if job.is_terminal() || (hidden && !wait) {
                    println!("{}: {}", diary_id, job.state);
                    if let Some(error) = job.error {
                        eprintln!("{}", error);
                    }
                    break;
                }
            }
        }
        Command::Undo => {
            let diary = controller.undo_last_deletion().await?;
            print_diary(&diary);
        }
        Command::AddVideo {
            diary_id,
            video_url,
            duration,
        } => {
            let video = controller.add_video(&diary_id, &video_url, duration).await?;
            println!("{}\t{}", video.id, video.video_url);
        }
    }
    Ok(())
}

#[async_std::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();
    let _guard = logging::init_logging();
    let args = Cli::parse();

    let cloud_storage = build_blob_store(&args)?;
    let local_cache = build_local_cache(&args)?;
    let services = create_app_services(
        Some(args.user.clone()),
        cloud_storage,
        local_cache,
        Settings::default(),
    )
    .await?;

    if let Err(e) = run(args, services).await {
        tracing::error!(error = %e, "Command failed");
        return Err(e);
    }
    Ok(())
}
