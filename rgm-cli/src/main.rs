use clap::{Parser, Subcommand};
use std::fs;
use std::path::{Path, PathBuf};

use rgm_core::{
    decompile_map, find_map_files, load_game_symbols, rebuild_map, MapContainer, ScriptSettings,
};

#[derive(Debug, Parser)]
#[command(name = "rgm-script", version, about = "Redguard map script decompiler and recompiler")]
struct Args {
    #[command(subcommand)]
    command: Command,

    /// JSON file with decompiler/recompiler settings.
    #[arg(long, global = true, value_name = "JSON")]
    settings: Option<PathBuf>,

    #[arg(long, global = true, default_value_t = false)]
    debug: bool,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Render every script header of one map as text.
    Decompile {
        #[arg(long)]
        game: PathBuf,

        #[arg(long)]
        map: PathBuf,

        /// Write here instead of stdout.
        #[arg(long)]
        output: Option<PathBuf>,
    },

    /// Compile edited text back into a copy of the map.
    Recompile {
        #[arg(long)]
        game: PathBuf,

        #[arg(long)]
        map: PathBuf,

        #[arg(long)]
        script: PathBuf,

        #[arg(long)]
        output: PathBuf,
    },

    /// Decompile every map under the game directory into one text file each.
    DecompileAll {
        #[arg(long)]
        game: PathBuf,

        #[arg(long)]
        output_dir: PathBuf,
    },
}

fn decompile_one(
    map: &Path,
    symbols: &rgm_core::SymbolDatabase,
    settings: &ScriptSettings,
) -> rgm_core::Result<String> {
    let bytes = fs::read(map)?;
    let container = MapContainer::decode(&bytes)?;
    log::info!(
        "{}: {} headers, {} records",
        map.display(),
        container.headers.len(),
        container.records().len()
    );
    decompile_map(&container, symbols, settings)
}

fn run(args: Args) -> rgm_core::Result<()> {
    let settings = match &args.settings {
        Some(path) => ScriptSettings::load(path)?,
        None => ScriptSettings::default(),
    };

    match args.command {
        Command::Decompile { game, map, output } => {
            let symbols = load_game_symbols(&game)?;
            let text = decompile_one(&map, &symbols, &settings)?;
            match output {
                Some(path) => fs::write(path, text)?,
                None => println!("{text}"),
            }
        }
        Command::Recompile {
            game,
            map,
            script,
            output,
        } => {
            let symbols = load_game_symbols(&game)?;
            let original = fs::read(&map)?;
            let text = fs::read_to_string(&script)?;
            let rebuilt = rebuild_map(&original, &text, &symbols, &settings)?;
            fs::write(&output, &rebuilt)?;
            log::info!("wrote {} ({} bytes)", output.display(), rebuilt.len());
        }
        Command::DecompileAll { game, output_dir } => {
            let symbols = load_game_symbols(&game)?;
            fs::create_dir_all(&output_dir)?;
            let maps = find_map_files(&game);
            let mut written = 0;
            for map in &maps {
                let text = match decompile_one(map, &symbols, &settings) {
                    Ok(text) => text,
                    Err(err) => {
                        log::warn!("skipping {}: {err}", map.display());
                        continue;
                    }
                };
                let stem = map
                    .file_stem()
                    .map(|s| s.to_string_lossy().into_owned())
                    .unwrap_or_default();
                fs::write(output_dir.join(format!("{stem}.txt")), text)?;
                written += 1;
            }
            log::info!("decompiled {written} of {} maps", maps.len());
        }
    }
    Ok(())
}

fn main() {
    let args = Args::parse();

    let level = if args.debug {
        log::LevelFilter::Debug
    } else {
        log::LevelFilter::Info
    };
    env_logger::Builder::new()
        .filter_level(level)
        .parse_default_env()
        .init();

    if let Err(err) = run(args) {
        eprintln!("Error: {err}");
        std::process::exit(1);
    }
}
