//! Board generation and reference clock, both taken from the environment.

use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::fan_control::BoardTopology;

pub const GENERATION_ENV: &str = "BOARD_GENERATION";

#[derive(Debug, Error)]
pub enum BoardError {
    #[error("BOARD_GENERATION is not set")]
    MissingGeneration,
    #[error("board generation must be 0, 1, or 2, not {0}")]
    InvalidGeneration(u8),
    #[error("{}: {source}", .path.display())]
    ClockRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("cannot read PCLK (cpu_1x) frequency from {}", .path.display())]
    ClockFormat { path: PathBuf },
}

/// Pick the board generation: the configured one (the `-g` flag is folded
/// into the config first), else the environment. In the environment only "2"
/// means generation 2; any other value means generation 1.
pub fn resolve_generation(configured: Option<u8>, env: Option<&str>) -> Result<u8, BoardError> {
    let generation = match (configured, env) {
        (Some(generation), _) => generation,
        (None, Some("2")) => 2,
        (None, Some(_)) => 1,
        (None, None) => return Err(BoardError::MissingGeneration),
    };
    tracing::debug!("board generation {}", generation);
    Ok(generation)
}

pub fn topology(generation: u8) -> Result<BoardTopology, BoardError> {
    BoardTopology::from_generation(generation).ok_or(BoardError::InvalidGeneration(generation))
}

/// Read the cpu_1x frequency in Hz: the first whitespace-separated token of
/// the file, in decimal.
pub fn read_pclk(path: &Path) -> Result<u64, BoardError> {
    let text = std::fs::read_to_string(path).map_err(|source| BoardError::ClockRead {
        path: path.to_path_buf(),
        source,
    })?;
    let hz = text
        .split_whitespace()
        .next()
        .and_then(|token| token.parse::<u64>().ok())
        .filter(|hz| *hz > 0)
        .ok_or_else(|| BoardError::ClockFormat {
            path: path.to_path_buf(),
        })?;
    tracing::info!("pclk is {:.6} MHz", hz as f64 / 1e6);
    Ok(hz)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;
    use std::io::Write;
    use tempfile::tempdir;

    #[test]
    fn test_generation_precedence() {
        assert_eq!(resolve_generation(Some(0), Some("2")).unwrap(), 0);
        assert_eq!(resolve_generation(Some(2), Some("1")).unwrap(), 2);
        assert_eq!(resolve_generation(None, Some("2")).unwrap(), 2);
        assert_eq!(resolve_generation(None, Some("0")).unwrap(), 1);
        assert_eq!(resolve_generation(None, Some("")).unwrap(), 1);
        assert!(matches!(
            resolve_generation(None, None),
            Err(BoardError::MissingGeneration)
        ));
    }

    #[test]
    fn test_command_line_generation_wins_over_file_and_environment() {
        use crate::cli::Cli;
        use crate::config::Config;
        use clap::Parser;

        let cli = Cli::try_parse_from(["fand", "-g", "0"]).unwrap();
        let mut config = Config::default();
        config.board.generation = Some(2);
        cli.apply(&mut config);
        assert_eq!(resolve_generation(config.board.generation, Some("2")).unwrap(), 0);
    }

    #[test]
    fn test_topology_from_generation() {
        assert_eq!(topology(1).unwrap(), BoardTopology::TwoFan);
        assert_eq!(topology(2).unwrap(), BoardTopology::FourSensor);
        assert!(matches!(topology(5), Err(BoardError::InvalidGeneration(5))));
    }

    #[test]
    fn test_read_pclk() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("clk_rate");
        let mut file = File::create(&path).unwrap();
        writeln!(file, "111111115").unwrap();
        assert_eq!(read_pclk(&path).unwrap(), 111_111_115);
    }

    #[test]
    fn test_read_pclk_errors() {
        let dir = tempdir().unwrap();
        assert!(matches!(
            read_pclk(&dir.path().join("missing")),
            Err(BoardError::ClockRead { .. })
        ));

        let path = dir.path().join("clk_rate");
        std::fs::write(&path, "fast\n").unwrap();
        assert!(matches!(read_pclk(&path), Err(BoardError::ClockFormat { .. })));
    }
}
