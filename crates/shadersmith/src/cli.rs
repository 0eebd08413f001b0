use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(
    name = "shadersmith",
    author,
    version,
    about = "Repair and check generated shader bundles"
)]
pub struct Cli {
    /// Configuration file; falls back to `$SHADERSMITH_CONFIG`, then the user config directory.
    #[arg(long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Split a bundle, repair its fragment stage and print the result as a bundle.
    Normalize(InputArgs),
    /// Build the bundle against the headless device and drive a few frames.
    Check(CheckArgs),
    /// Show the default recipe and vertex count for a geometry name.
    Geometry(GeometryArgs),
}

#[derive(Args, Debug)]
pub struct InputArgs {
    /// Bundle file, or `-` to read standard input.
    #[arg(value_name = "FILE|-")]
    pub input: PathBuf,
}

#[derive(Args, Debug)]
pub struct CheckArgs {
    #[command(flatten)]
    pub input: InputArgs,

    /// Frames to drive after the program goes live (overrides `playback.frames`).
    #[arg(long, value_name = "N")]
    pub frames: Option<u32>,

    /// Override the viewport (e.g. `1280x720`).
    #[arg(long, value_name = "WIDTHxHEIGHT", value_parser = parse_dimensions)]
    pub size: Option<(u32, u32)>,

    /// Emit the report as JSON.
    #[arg(long)]
    pub json: bool,
}

#[derive(Args, Debug)]
pub struct GeometryArgs {
    /// `cube`, `sphere`, `plane`, `cylinder` or `torus`; anything else resolves to `cube`.
    #[arg(value_name = "NAME")]
    pub name: String,
}

pub fn parse() -> Cli {
    Cli::parse()
}

fn parse_dimensions(value: &str) -> Result<(u32, u32), String> {
    let (w, h) = value
        .split_once(['x', 'X'])
        .ok_or_else(|| "expected WIDTHxHEIGHT".to_string())?;
    let width = w
        .trim()
        .parse::<u32>()
        .map_err(|_| "invalid width".to_string())?;
    let height = h
        .trim()
        .parse::<u32>()
        .map_err(|_| "invalid height".to_string())?;
    if width == 0 || height == 0 {
        return Err("dimensions must be greater than zero".into());
    }
    Ok((width, height))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_dimensions() {
        assert_eq!(parse_dimensions("1280x720"), Ok((1280, 720)));
        assert_eq!(parse_dimensions(" 64 X 32 "), Ok((64, 32)));
        assert!(parse_dimensions("1280").is_err());
        assert!(parse_dimensions("0x10").is_err());
    }

    #[test]
    fn check_accepts_global_config_after_subcommand() {
        let cli = Cli::try_parse_from([
            "shadersmith",
            "check",
            "bundle.txt",
            "--frames",
            "5",
            "--config",
            "view.toml",
            "--json",
        ])
        .expect("parse");
        assert_eq!(cli.config, Some(PathBuf::from("view.toml")));
        match cli.command {
            Command::Check(args) => {
                assert_eq!(args.input.input, PathBuf::from("bundle.txt"));
                assert_eq!(args.frames, Some(5));
                assert!(args.json);
                assert_eq!(args.size, None);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }
}
