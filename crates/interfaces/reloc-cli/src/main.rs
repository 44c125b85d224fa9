use camino::Utf8PathBuf;
use clap::builder::FalseyValueParser;
use clap::{Parser, Subcommand};
use reloc_cli::{commands, PackArgs};
use reloc_config::{
    env_flag, DEFAULT_MAX_LIBRARY_DEPTH, ENV_DEBUG, ENV_SKIP_LIBRARIES, ENV_SOURCE_ORIGIN,
    ENV_TARGET_DIR,
};
use tracing::Level;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[derive(Parser)]
#[command(author, version, about)]
struct Cli {
    #[arg(short, long, global = true)]
    verbose: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Copy a project and every file it references into one directory
    Pack {
        project: Utf8PathBuf,
        #[arg(short, long, env = ENV_TARGET_DIR, help = "Export directory")]
        target: Utf8PathBuf,
        #[arg(
            long,
            env = ENV_SKIP_LIBRARIES,
            value_parser = FalseyValueParser::new(),
            help = "Copy linked libraries without packing their own dependencies"
        )]
        skip_libraries: bool,
        #[arg(long, help = "Pack each linked library in a separate process")]
        isolate_libraries: bool,
        #[arg(long, default_value_t = DEFAULT_MAX_LIBRARY_DEPTH)]
        max_depth: usize,
        #[arg(
            long,
            env = ENV_SOURCE_ORIGIN,
            help = "Resolve relative references as if the project lived here"
        )]
        origin: Option<Utf8PathBuf>,
        #[arg(long, help = "Do not search the export directory for missing files")]
        no_search: bool,
        #[arg(long, help = "Do not write <target>/<project>.log")]
        no_log_file: bool,
    },
    /// List every file a project references
    Deps {
        project: Utf8PathBuf,
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let level = if cli.verbose || env_flag(ENV_DEBUG) {
        Level::DEBUG
    } else {
        Level::WARN
    };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level.as_str().to_ascii_lowercase()));
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber).expect("default subscriber");

    match cli.command {
        Commands::Pack {
            project,
            target,
            skip_libraries,
            isolate_libraries,
            max_depth,
            origin,
            no_search,
            no_log_file,
        } => {
            let code = commands::cmd_pack(PackArgs {
                project,
                target,
                skip_libraries,
                isolate_libraries,
                max_depth,
                origin,
                no_search,
                no_log_file,
            })
            .await?;
            if code != 0 {
                std::process::exit(code);
            }
        }
        Commands::Deps { project, json } => commands::cmd_deps(project, json).await?,
    }

    Ok(())
}
