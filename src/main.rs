use anyhow::Context;
use clap::Parser;
use gcodelink::bridge::{ChannelTransport, Controller, ControllerOptions, PeerTransport};
use gcodelink::{init_logging, Config, EventBus, FileProgramSource, RealSerialPort};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Serial bridge and job streamer for GRBL-class motion controllers
#[derive(Debug, Parser)]
#[command(name = "gcodelink", version = gcodelink::VERSION)]
struct Cli {
    /// Configuration file (.toml or .json)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Serial port of the controller
    #[arg(short, long)]
    port: Option<String>,

    /// Serial baud rate
    #[arg(short, long)]
    baud: Option<u32>,

    /// Address the interactive peer connects to
    #[arg(short, long)]
    listen: Option<String>,

    /// Directory that job programs are read from
    #[arg(long)]
    program_dir: Option<PathBuf>,

    /// Start a job for this program once connected
    #[arg(long, value_name = "PROGRAM")]
    run: Option<String>,

    /// List candidate serial ports and exit
    #[arg(long)]
    list_ports: bool,

    /// Emit logs as JSON lines
    #[arg(long)]
    log_json: bool,
}

impl Cli {
    fn apply(&self, config: &mut Config) {
        if let Some(port) = &self.port {
            config.serial.port = port.clone();
        }
        if let Some(baud) = self.baud {
            config.serial.baud_rate = baud;
        }
        if let Some(listen) = &self.listen {
            config.interactive.listen_addr = listen.clone();
        }
        if let Some(dir) = &self.program_dir {
            config.job.program_dir = dir.clone();
        }
    }
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.log_json)?;

    if cli.list_ports {
        for port in gcodelink::list_ports()? {
            println!("{}\t{}", port.port_name, port.description);
        }
        return Ok(());
    }

    let mut config = Config::load_or_default(cli.config.as_deref())?;
    cli.apply(&mut config);
    config.validate()?;

    tracing::info!(
        "gcodelink {} (built {}) on {} at {} baud",
        gcodelink::VERSION,
        gcodelink::BUILD_DATE,
        config.serial.port,
        config.serial.baud_rate
    );

    let link = RealSerialPort::open(&config.serial.connection_params())
        .with_context(|| format!("opening {}", config.serial.port))?;
    let source = FileProgramSource::new(config.job.program_dir.clone());

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .thread_name("gcodelink-io")
        .build()?;
    let (transport, listener) = runtime
        .block_on(ChannelTransport::bind(&config.interactive.listen_addr))
        .with_context(|| format!("listening on {}", config.interactive.listen_addr))?;

    let bus = Arc::new(EventBus::new());
    let mut controller = Controller::new(
        Box::new(link),
        Box::new(source),
        ControllerOptions::from_config(&config),
        bus,
    );
    let handle = controller.handle();

    if let Some(program) = &cli.run {
        handle.start(program.clone())?;
    }

    let signal_handle = handle.clone();
    runtime.spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Interrupted, shutting down");
            let _ = signal_handle.shutdown();
        }
    });

    let tick = config.link.tick_interval();
    let worker = std::thread::Builder::new()
        .name("gcodelink-loop".to_string())
        .spawn(move || run_loop(&mut controller, transport, tick))?;

    let result = worker
        .join()
        .map_err(|_| anyhow::anyhow!("polling loop panicked"))?;

    listener.abort();
    runtime.shutdown_timeout(Duration::from_secs(1));
    result
}

fn run_loop(
    controller: &mut Controller,
    mut transport: ChannelTransport,
    tick: Duration,
) -> anyhow::Result<()> {
    let result = loop {
        if controller.shutdown_requested() {
            break Ok(());
        }
        if let Err(e) = controller.tick(&mut transport as &mut dyn PeerTransport, Instant::now()) {
            tracing::error!("Serial link lost: {}", e);
            break Err(e.into());
        }
        std::thread::sleep(tick);
    };

    if controller.job().state().is_active() {
        if let Err(e) = controller.stop_job() {
            tracing::warn!("Stopping job on exit failed: {}", e);
        }
    }
    controller.close();
    result
}
