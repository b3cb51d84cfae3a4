//! Headless samnotator driver.
//!
//! Usage: `samnotator [--project DIR] [IMAGE_OR_FOLDER...]`

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use samnotator::{AppConfig, Session, SessionError};

#[derive(Parser, Debug)]
#[command(name = "samnotator")]
#[command(about = "Open images or a saved samnotator project and print a summary")]
struct Args {
    /// Project directory to load instead of images
    #[arg(long, value_name = "DIR")]
    project: Option<PathBuf>,

    /// Image files, or a single folder of images
    #[arg(value_name = "IMAGE_OR_FOLDER")]
    inputs: Vec<PathBuf>,
}

fn open_inputs(session: &mut Session, inputs: &[PathBuf]) -> Result<usize, SessionError> {
    match inputs {
        [dir] if dir.is_dir() => session.open_folder(dir),
        _ => Ok(session.open_images(inputs)),
    }
}

fn print_summary(session: &Session) {
    println!("frames:      {}", session.frames().len());
    println!("instances:   {}", session.instances().len());
    for info in session.instances().iter() {
        println!(
            "  {} {} [{}] colour {:?}",
            info.id(),
            info.name(),
            info.category().unwrap_or("-"),
            info.colour.0
        );
    }
    println!("points:      {}", session.annotations().point_count());
    println!("boxes:       {}", session.annotations().box_count());
    println!("categories:  {}", session.instances().all_categories().join(", "));
    for entry in &session.config().models {
        println!("model:       {} ({:?}) at {:?}", entry.name, entry.kind, entry.path);
    }
}

fn main() -> ExitCode {
    let args = Args::parse();
    let config = AppConfig::load_from_default_path().unwrap_or_default();

    env_logger::Builder::new()
        .filter_level(config.preferences.log_level.to_level_filter())
        .parse_default_env()
        .init();

    let mut session = Session::new(config);

    if let Some(dir) = &args.project {
        if let Err(e) = session.load_project(dir) {
            eprintln!("Failed to load project {:?}: {}", dir, e);
            return ExitCode::FAILURE;
        }
    } else if !args.inputs.is_empty() {
        match open_inputs(&mut session, &args.inputs) {
            Ok(count) => log::info!("Opened {} frames", count),
            Err(e) => {
                eprintln!("Failed to open inputs: {}", e);
                return ExitCode::FAILURE;
            }
        }
    }

    print_summary(&session);
    ExitCode::SUCCESS
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_args_project_and_inputs() {
        let args = Args::try_parse_from(["samnotator", "--project", "out", "a.png", "b.png"]).unwrap();
        assert_eq!(args.project, Some(PathBuf::from("out")));
        assert_eq!(args.inputs, vec![PathBuf::from("a.png"), PathBuf::from("b.png")]);
    }

    #[test]
    fn test_args_project_needs_a_value() {
        assert!(Args::try_parse_from(["samnotator", "--project"]).is_err());
    }

    #[test]
    fn test_args_empty() {
        let args = Args::try_parse_from(["samnotator"]).unwrap();
        assert!(args.project.is_none());
        assert!(args.inputs.is_empty());
    }
}
