use anyhow::{Context, Result, anyhow, bail};
use log::{info, warn};
use pico_args::Arguments;
use std::{
    fs::File,
    io::{self, BufRead, BufReader, IsTerminal},
    path::{Path, PathBuf},
};

use crate::backlight::{self, BrightnessController, Level};
use crate::config::{self, Settings};
use crate::frame::PpmStream;
use crate::landmarks::{LandmarkSource, NdjsonLandmarks, NoHands};
use crate::overlay::{self, ConsoleOverlay};
use crate::session::Session;

pub fn run() -> Result<()> {
    let mut pargs = Arguments::from_env();

    if pargs.contains("-h") || pargs.contains("--help") {
        print_help();
        return Ok(());
    }

    let config: Option<PathBuf> = pargs.opt_value_from_str("--config")?;

    // First free arg is the subcommand; none means `run`
    let subcmd: Option<String> = pargs.free_from_str().ok();

    match subcmd.as_deref() {
        None | Some("run") => run_session(config.as_deref()),

        Some("help") => {
            let topic: Option<String> = pargs.free_from_str().ok();
            match topic {
                Some(t) => print_subcmd_help(&t),
                None => print_help(),
            }
            Ok(())
        }

        Some("doctor") => {
            let loaded = Settings::load(config.as_deref())?;
            let report = loaded.settings.doctor_report(loaded.path.as_deref());
            print_response(&report);
            Ok(())
        }

        Some("set") => {
            let raw: u8 = pargs
                .free_from_str()
                .map_err(|_| anyhow!("usage: brightctl set <0-100>"))?;
            let level = Level::try_from(raw).map_err(|e| anyhow!(e))?;
            let loaded = Settings::load(config.as_deref())?;
            let mut controller = backlight::open(&loaded.settings.backlight)?;
            controller.set_brightness(level)?;
            println!("ok: display brightness set to {level}");
            Ok(())
        }

        Some(other) => {
            eprintln!("unknown subcommand: {other}\n");
            print_help();
            Ok(())
        }
    }
}

fn run_session(config: Option<&Path>) -> Result<()> {
    let loaded = Settings::load(config)?;
    match &loaded.path {
        Some(p) => info!("config: {}", p.display()),
        None => info!("config: built-in defaults"),
    }
    let settings = &loaded.settings;

    let frames = open_camera(&settings.camera.source)?;

    let hands: Box<dyn LandmarkSource> = match &settings.landmarks.source {
        Some(p) => {
            let f = File::open(p)
                .with_context(|| format!("failed to open landmark feed {}", p.display()))?;
            info!("landmarks: reading {}", p.display());
            Box::new(NdjsonLandmarks::spawn(BufReader::new(f)))
        }
        None => {
            warn!("no landmark feed configured; fist gesture disabled");
            Box::new(NoHands)
        }
    };

    let controller = backlight::open(&settings.backlight)?;

    let stop = overlay::register_stop_signals()?;
    let mut screen = ConsoleOverlay::new(stop);
    if let Some(p) = &settings.preview.path {
        screen = screen.with_preview_path(p)?;
    }

    let mut session = Session::new(settings, frames, hands, controller, screen);
    let end = session.run();
    info!("session finished, last status: {}", end.status.label());
    Ok(())
}

fn open_camera(source: &str) -> Result<PpmStream<Box<dyn BufRead>>> {
    let reader: Box<dyn BufRead> = if source == "-" {
        let stdin = io::stdin();
        if stdin.is_terminal() {
            bail!("no camera stream: pipe PPM frames into stdin or set camera.source (see `brightctl help run`)");
        }
        Box::new(stdin.lock())
    } else {
        let f = File::open(source).with_context(|| format!("camera not available at {source}"))?;
        Box::new(BufReader::new(f))
    };
    info!("camera: reading frames from {}", if source == "-" { "stdin" } else { source });
    Ok(PpmStream::new(reader))
}

fn print_help() {
    println!(
        r#"brightctl — ambient-light display brightness with a fist-gesture reset

USAGE:
  brightctl [run] [--config <path>]       Watch the camera and drive the backlight
  brightctl doctor [--config <path>]      Diagnose backlight, camera and permissions
  brightctl set <0-100>                   Set display brightness once
  brightctl help [command]                Show general or command-specific help
  brightctl help config                   Print the reference configuration

TIPS:
  - Camera frames: ffmpeg -f v4l2 -i /dev/video0 -f image2pipe -vcodec ppm - | brightctl
  - Config: ~/.config/brightctl/config.toml (optional, defaults built in)
  - Log level: BRIGHTCTL_LOG=debug
"#
    );
}

fn print_subcmd_help(cmd: &str) {
    match cmd {
        "run" => println!(
            "usage: brightctl run [--config <path>]\nReads PPM frames (stdin or camera.source), raises brightness on a sudden\ndarkening and resets it when a closed fist is shown. Ctrl-C to quit."
        ),
        "doctor" => println!(
            "usage: brightctl doctor [--config <path>]\nPrints backlight devices, camera nodes, group membership and effective settings."
        ),
        "set" => println!("usage: brightctl set <0-100>\nApplies one brightness level and exits."),
        "config" => print!("{}", config::reference_config_text()),
        _ => {
            eprintln!("unknown command: {cmd}\n");
            print_help();
        }
    }
}

fn print_response(v: &serde_json::Value) {
    println!("{}", serde_json::to_string_pretty(v).unwrap_or_default());
}
