//! Convert local development notebooks to Google Colab format.
//!
//! ## Usage
//!
//! ```bash
//! convert-to-colab
//! convert-to-colab --project-folder MyFolder --notebooks-dir notebooks
//! ```
//!
//! Output goes to `notebooks/colab/<same filename>.ipynb`. Students are
//! expected to have this layout in their Drive:
//!
//! ```text
//! MyDrive/
//! └── Distant_viewing/        <- project folder, shared with students
//!     ├── notebooks/
//!     ├── data/
//!     │   ├── images/
//!     │   └── embeddings/
//!     ├── models/
//!     └── misc/
//!         └── api-key-europeana.txt
//! ```

use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;

use distant_viewing::cli::CommonArgs;
use distant_viewing::colab::{self, ConvertOptions};

#[derive(Debug, Parser)]
#[command(
    name = "convert-to-colab",
    version,
    about = "Convert workshop notebooks to Google Colab format"
)]
struct Args {
    /// Name of the shared Google Drive folder (default: Distant_viewing)
    #[arg(long, value_name = "NAME")]
    project_folder: Option<String>,

    /// Directory holding the local notebooks (default: notebooks)
    #[arg(long, value_name = "PATH")]
    notebooks_dir: Option<PathBuf>,

    /// Where converted notebooks go (default: <notebooks-dir>/colab)
    #[arg(long, value_name = "PATH")]
    output_dir: Option<PathBuf>,

    /// Images inlined into markdown cells (default: misc/assets/img)
    #[arg(long, value_name = "PATH")]
    assets_dir: Option<PathBuf>,

    #[command(flatten)]
    common: CommonArgs,
}

fn main() -> Result<()> {
    let args = Args::parse();
    let mut config = args.common.bootstrap()?;

    if let Some(folder) = args.project_folder {
        config.colab.project_folder = folder;
    }
    if let Some(dir) = args.notebooks_dir {
        config.colab.notebooks_dir = dir;
    }
    if let Some(dir) = args.output_dir {
        config.colab.output_dir = Some(dir);
    }
    if let Some(dir) = args.assets_dir {
        config.colab.assets_dir = dir;
    }

    let options = ConvertOptions::from_config(&config.colab);
    let summary = colab::convert_directory(&options)?;

    println!();
    println!(
        "Converted {} notebook(s), {} failed -> {}/",
        summary.converted,
        summary.failed,
        options.output_dir.display()
    );
    println!("  Google Drive path : {}", options.project_root());
    println!();
    println!("Next steps:");
    println!("  1. Share the following folder with students via Google Drive:");
    println!("       MyDrive/{}/", options.project_folder);
    println!("     It should contain: data/  models/  misc/  and the colab notebooks");
    println!("  2. Put the Europeana API key in misc/api-key-europeana.txt");
    println!("  3. Students open a notebook in Colab, run the mount cell, then the install cell");

    Ok(())
}
