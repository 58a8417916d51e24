use std::io::{self, BufRead, Write};

use anyhow::{Context, Result};
use clap::Parser;

use volume_bridge::app::{HeadlessHost, WindowedHost};
use volume_bridge::cli::Cli;
use volume_bridge::config::BridgeConfig;
use volume_bridge::core::publish_loop::PublishLoop;
use volume_bridge::core::publisher::{PublishChannel, SharedFramePublisher, TexturePublisher};
use volume_bridge::dataset::{ScalarVolume, VolumeDataset};
use volume_bridge::prompt;

type Channel = PublishChannel<Box<dyn TexturePublisher>>;

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    let mut config = BridgeConfig::load_or_default(cli.config.as_deref()).context("Failed to load configuration")?;
    cli.apply(&mut config);
    config.validate().context("Invalid configuration")?;

    let stdin = io::stdin();
    let mut input = stdin.lock();
    let mut output = io::stdout();
    let volume = select_volume(&cli, &mut input, &mut output)?;

    let depth = open_channel(&config, &config.depth_sender)?;
    let color = open_channel(&config, &config.color_sender)?;
    let mut publish_loop = PublishLoop::new(&config, depth, color)?;

    log::info!(
        "Publishing '{}' and '{}' at {} fps into {}",
        config.color_sender,
        config.depth_sender,
        config.target_fps,
        config.share_dir.display()
    );

    if cli.headless {
        let mut host = HeadlessHost::new(&config, &volume, cli.frames)
            .context("Failed to start offscreen renderer")?
            .with_final_snapshot(cli.snapshot_last);
        publish_loop.run(&mut host, std::thread::sleep)?;
    } else {
        println!("Controls: drag to rotate, scroll to zoom, WASD/arrows to pan, P snapshot, E/C to close");
        let mut host = WindowedHost::new(config.clone(), volume).context("Failed to open viewer window")?;
        publish_loop.run(&mut host, std::thread::sleep)?;
    }

    log::info!(
        "Done: {} frames published, {} skipped",
        publish_loop.published_frames(),
        publish_loop.skipped_frames()
    );
    Ok(())
}

/// Load the dataset and pick the field, asking for whatever the command line left out
fn select_volume<R: BufRead, W: Write>(cli: &Cli, input: &mut R, output: &mut W) -> Result<ScalarVolume> {
    let data = match &cli.data {
        Some(data) => data.clone(),
        None => prompt::prompt_file(input, output, "simulation file")?,
    };
    let particles = match &cli.particles {
        Some(particles) => Some(particles.clone()),
        None => prompt::prompt_optional_file(input, output, "particle file")?,
    };

    let dataset = VolumeDataset::load(&data, particles.as_deref())
        .with_context(|| format!("Failed to load dataset {}", data.display()))?;

    let fields = dataset.field_list();
    let field = match &cli.field {
        Some(field) if dataset.has_field(field) => field.clone(),
        Some(field) => {
            writeln!(output, "Field '{field}' not found in {}", dataset.source().display())?;
            prompt::prompt_field(input, output, &fields)?
        }
        None => prompt::prompt_field(input, output, &fields)?,
    };

    let volume = dataset.scalar_volume(&field)?;
    if volume.log_scaled {
        log::info!("Field '{}' spans several decades, rendering log10", field);
    }
    Ok(volume)
}

fn open_channel(config: &BridgeConfig, name: &str) -> Result<Channel> {
    let publisher: Box<dyn TexturePublisher> = Box::new(SharedFramePublisher::new(config.share_dir.clone()));
    PublishChannel::new(name, publisher).with_context(|| format!("Failed to open publish channel '{name}'"))
}
