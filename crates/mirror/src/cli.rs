use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(
    name = "magic-mirror",
    author,
    version,
    about = "Camera magic mirror effect renderer"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// List the effect catalog (id and display name).
    Effects,
    /// Print the complete fragment program for an effect id.
    Shader(ShaderArgs),
    /// Render frames headlessly through an effect.
    Run(RunArgs),
}

#[derive(Parser, Debug)]
pub struct ShaderArgs {
    /// Effect id (e.g. `swirl`); unknown ids print the identity program.
    #[arg(value_name = "ID")]
    pub id: String,
}

#[derive(Parser, Debug)]
pub struct RunArgs {
    /// TOML configuration file; flags below override its values.
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Effect id to render with.
    #[arg(long, value_name = "ID")]
    pub effect: Option<String>,

    /// Stop after this many frames have been rendered.
    #[arg(long, value_name = "N", default_value_t = 30)]
    pub frames: u64,

    /// FPS ceiling for rendered frames.
    #[arg(long, value_name = "FPS")]
    pub max_fps: Option<f32>,

    /// Render every Nth frame that passes the FPS ceiling.
    #[arg(long, value_name = "N")]
    pub frame_skip: Option<u32>,

    /// Output surface size (e.g. `720x1280`).
    #[arg(long, value_name = "WIDTHxHEIGHT", value_parser = parse_size)]
    pub size: Option<(u32, u32)>,

    /// Still image replayed as the camera feed instead of the test pattern.
    #[arg(long, value_name = "PATH")]
    pub input: Option<PathBuf>,

    /// Save the final output surface to this PNG path.
    #[arg(long, value_name = "PATH")]
    pub output: Option<PathBuf>,

    /// Print the final status as JSON.
    #[arg(long)]
    pub json: bool,

    /// Give up after this many seconds even if fewer frames were rendered.
    #[arg(long, value_name = "SECONDS", default_value_t = 30.0)]
    pub timeout: f64,
}

pub fn parse() -> Cli {
    Cli::parse()
}

pub fn parse_size(value: &str) -> Result<(u32, u32), String> {
    let (w, h) = value
        .trim()
        .split_once(['x', 'X'])
        .ok_or_else(|| "expected WIDTHxHEIGHT".to_string())?;
    let width = w
        .trim()
        .parse::<u32>()
        .map_err(|_| format!("invalid width '{}'", w.trim()))?;
    let height = h
        .trim()
        .parse::<u32>()
        .map_err(|_| format!("invalid height '{}'", h.trim()))?;
    if width == 0 || height == 0 {
        return Err("surface dimensions must be greater than zero".into());
    }
    Ok((width, height))
}
