//! Board selection and the simulated target behind it

use std::path::{Path, PathBuf};

use progmem_core::board::{self, BoardConfig, BoardFile, DEFAULT_BOARD};
use progmem_core::bus::YieldStall;
use progmem_core::Flash;
use progmem_sim::{SimConfig, SimController};

use crate::cli::TargetArgs;
use crate::error::CommandError;

/// Board constants plus a name to show the user
#[derive(Debug, Clone)]
pub struct ResolvedBoard {
    pub name: String,
    pub description: String,
    pub config: BoardConfig,
}

/// Pick the board named on the command line, a board file, or the default
pub fn resolve_board(args: &TargetArgs) -> Result<ResolvedBoard, Box<dyn std::error::Error>> {
    if let Some(path) = &args.board_file {
        let file = BoardFile::from_toml_file(path)?;
        log::info!("Using board file {}", path.display());
        // Unnamed boards go by the file name
        let name = file.name.unwrap_or_else(|| {
            path.file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_else(|| "custom".to_string())
        });
        return Ok(ResolvedBoard {
            name,
            description: format!("Board file {}", path.display()),
            config: file.config,
        });
    }

    let preset = match &args.board {
        Some(name) => board::find(name).ok_or_else(|| CommandError::UnknownBoard(name.clone()))?,
        None => &DEFAULT_BOARD,
    };
    Ok(ResolvedBoard {
        name: preset.name.to_string(),
        description: preset.description.to_string(),
        config: preset.config,
    })
}

/// A simulated controller whose array is backed by an image file
pub struct FlashHandle {
    board: ResolvedBoard,
    sim: SimController,
    image: PathBuf,
}

impl FlashHandle {
    /// Open (or start) the image for the selected board
    pub fn open(args: &TargetArgs) -> Result<Self, Box<dyn std::error::Error>> {
        let board = resolve_board(args)?;
        let sim = SimController::open_image(SimConfig::from_board(&board.config), &args.image)?;
        log::debug!("Opened {} for {}", args.image.display(), board.name);
        Ok(Self {
            board,
            sim,
            image: args.image.clone(),
        })
    }

    pub fn board(&self) -> &ResolvedBoard {
        &self.board
    }

    pub fn image(&self) -> &Path {
        &self.image
    }

    /// Driver bound to the simulated controller
    pub fn flash(&self) -> Flash<&SimController, YieldStall> {
        Flash::new(&self.sim, YieldStall, &self.board.config)
    }

    /// Write the array back to the image file
    pub fn save(&self) -> Result<(), Box<dyn std::error::Error>> {
        self.sim.save_image(&self.image)?;
        log::info!("Saved {}", self.image.display());
        Ok(())
    }
}
