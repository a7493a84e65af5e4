use mimalloc::MiMalloc;
use modules::{
    common::signal::SignalManager,
    common::tls::MailroomTls,
    context::Initialize,
    database::manager::DatabaseManager,
    error::MailroomResult,
    logger,
    settings::{cli::SETTINGS, dir::DataDirManager},
    tasks::{queue::MailroomTaskQueue, PeriodicTasks},
};
use tracing::info;

mod modules;

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

static LOGO: &str = r#"
  __  __       _ _
 |  \/  | __ _(_) |_ __ ___   ___  _ __ ___
 | |\/| |/ _` | | | '__/ _ \ / _ \| '_ ` _ \
 | |  | | (_| | | | | | (_) | (_) | | | | | |
 |_|  |_|\__,_|_|_|_|  \___/ \___/|_| |_| |_|

"#;

#[tokio::main]
async fn main() -> MailroomResult<()> {
    logger::initialize_logging();
    info!("{}", LOGO);
    info!("Starting mailroom");
    info!("Version:  {}", mailroom_version!());
    info!("Git:      [{}]", env!("GIT_HASH"));

    if let Err(error) = initialize().await {
        eprintln!("{:?}", error);
        return Err(error);
    }

    let mut shutdown = modules::common::signal::SIGNAL_MANAGER.subscribe();
    let _ = shutdown.recv().await;
    info!("mailroom shut down");
    Ok(())
}

/// Initialize the system by validating settings and starting background workers.
async fn initialize() -> MailroomResult<()> {
    SETTINGS.validate()?;
    SignalManager::initialize().await?;
    DataDirManager::initialize().await?;
    MailroomTls::initialize().await?;
    DatabaseManager::initialize().await?;
    MailroomTaskQueue::initialize().await?;
    PeriodicTasks::start_background_tasks();
    Ok(())
}
