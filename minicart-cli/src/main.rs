use anyhow::Context;
use clap::{Args, Parser, Subcommand, ValueEnum};
use env_logger::Env;
use minicart_core::{CartConfig, NameSource, PackOptions, RomImage, RunConfig, RunScript};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "minicart", about = "Flashcart controller tooling")]
struct Cli {
    /// Cartridge configuration TOML file; defaults are used for anything it leaves out
    #[arg(short = 'c', long = "config", global = true)]
    config_path: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Build a store image from the menu and a set of user ROMs
    Pack(PackArgs),
    /// Boot the controller against a simulated console and check what it serves
    Run(RunArgs),
    /// Print the effective cartridge configuration
    ShowConfig,
}

#[derive(Clone, Copy, ValueEnum)]
enum NameSourceArg {
    FileName,
    Header,
}

impl From<NameSourceArg> for NameSource {
    fn from(value: NameSourceArg) -> Self {
        match value {
            NameSourceArg::FileName => Self::FileName,
            NameSourceArg::Header => Self::Header,
        }
    }
}

#[derive(Args)]
struct PackArgs {
    /// Menu image for slot 0, or the only image for the single layout
    #[arg(short = 'm', long = "menu")]
    menu_path: PathBuf,
    #[arg(short = 'o', long = "output")]
    output_path: PathBuf,
    #[arg(long = "name-source", value_enum, default_value_t = NameSourceArg::FileName)]
    name_source: NameSourceArg,
    #[arg(long = "uppercase", default_value_t = false)]
    uppercase: bool,
    #[arg(long = "no-resume-patch", default_value_t = false)]
    no_resume_patch: bool,
    roms: Vec<PathBuf>,
}

#[derive(Args)]
struct RunArgs {
    /// Store image as written to flash at the image store offset
    #[arg(short = 's', long = "store")]
    store_path: String,
    #[arg(long = "slot", default_value_t = 1, conflicts_with = "trace_path")]
    slot: u8,
    #[arg(long = "menu-reads", default_value_t = 256)]
    menu_reads: u32,
    #[arg(long = "image-reads", default_value_t = 4096)]
    image_reads: u32,
    /// Replay a recorded bus trace instead of scripting a menu selection
    #[arg(short = 't', long = "trace")]
    trace_path: Option<String>,
    #[arg(long = "save-trace")]
    save_trace_path: Option<String>,
    #[arg(long = "max-spins", default_value_t = 10_000_000)]
    max_spins: u64,
}

fn load_cart_config(path: Option<&Path>) -> anyhow::Result<CartConfig> {
    let Some(path) = path else {
        return Ok(CartConfig::default());
    };

    let config_str = fs::read_to_string(path)
        .with_context(|| format!("error reading TOML config file from '{}'", path.display()))?;
    let config: CartConfig = toml::from_str(&config_str).with_context(|| {
        format!("error parsing cartridge config from TOML file at '{}'", path.display())
    })?;

    config.validate().context("invalid cartridge configuration")?;

    Ok(config)
}

fn pack(config: &CartConfig, args: PackArgs) -> anyhow::Result<()> {
    let boot_image = fs::read(&args.menu_path)
        .with_context(|| format!("error reading menu image from '{}'", args.menu_path.display()))?;

    let roms = args
        .roms
        .iter()
        .map(|path| {
            RomImage::from_file(path)
                .with_context(|| format!("error reading ROM from '{}'", path.display()))
        })
        .collect::<anyhow::Result<Vec<_>>>()?;

    let options = PackOptions {
        name_source: args.name_source.into(),
        uppercase: args.uppercase,
        patch_resume: !args.no_resume_patch,
    };

    let packed = minicart_core::pack_store(config, &boot_image, roms, &options)?;

    fs::write(&args.output_path, &packed.image).with_context(|| {
        format!("error writing store image to '{}'", args.output_path.display())
    })?;

    log::info!("Wrote {}", args.output_path.display());
    print!("{packed}");

    Ok(())
}

fn run(config: &CartConfig, args: RunArgs) -> anyhow::Result<()> {
    let script = match args.trace_path {
        Some(trace_path) => RunScript::Trace { trace_path },
        None => RunScript::Select {
            slot: args.slot,
            menu_reads: args.menu_reads,
            image_reads: args.image_reads,
        },
    };

    let run_config = RunConfig {
        store_path: args.store_path,
        script,
        save_trace_path: args.save_trace_path,
        max_spins: args.max_spins,
    };

    log::info!("Running with config:\n{config}\n{run_config}");

    let summary = minicart_core::run(config, &run_config)?;
    print!("{summary}");

    if !summary.is_clean() {
        anyhow::bail!(
            "controller served {} mismatched bytes with {} bus faults",
            summary.mismatches.len(),
            summary.faults.len()
        );
    }

    Ok(())
}

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    let args = Cli::parse();

    let config = load_cart_config(args.config_path.as_deref())?;

    match args.command {
        Command::Pack(pack_args) => pack(&config, pack_args),
        Command::Run(run_args) => run(&config, run_args),
        Command::ShowConfig => {
            print!("{config}");
            Ok(())
        }
    }
}
