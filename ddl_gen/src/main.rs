use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

mod cmds;

#[derive(Parser)]
#[command(name = "ddl-gen")]
#[command(about = "Schema compiler for fixed-layout binary record types", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /* Generate C++ from schema documents */
    Codegen {
        /* Input YAML schema documents */
        #[arg(short = 'f', long = "files", value_name = "FILE", required = true)]
        files: Vec<PathBuf>,

        /* Include directories searched for imported documents */
        #[arg(short = 'I', long = "include-dir", value_name = "DIR")]
        include_dirs: Vec<PathBuf>,

        /* Backend to run */
        #[arg(short = 'b', long = "backend", value_enum)]
        backend: BackendKind,

        /* Output declaration (header) file */
        #[arg(long = "decl", value_name = "PATH")]
        decl: PathBuf,

        /* Output definition (source) file */
        #[arg(long = "def", value_name = "PATH")]
        def: PathBuf,

        /* Directory prefix used when the definition file includes the header */
        #[arg(long = "include-prefix", value_name = "PREFIX")]
        include_prefix: Option<String>,

        /* Namespace wrapping everything generated */
        #[arg(long = "top-namespace", value_name = "NS")]
        top_namespace: Option<String>,

        /* Namespace of the abstract interface types */
        #[arg(long = "interface-ns", value_name = "NS")]
        interface_ns: Option<String>,

        /* Namespace of the generated accessor classes */
        #[arg(long = "native-ns", value_name = "NS")]
        native_ns: Option<String>,

        /* Type ids the dispatcher accepts but ignores */
        #[arg(long = "ignore-type-id", value_name = "ID")]
        ignore_type_ids: Vec<u32>,

        /* Print the schema report instead of generating code */
        #[arg(long = "dump-schema")]
        dump_schema: bool,

        /* Enable verbose output */
        #[arg(short = 'v', long = "verbose")]
        verbose: bool,
    },

    /* Print the resolved model as YAML or JSON */
    Dump {
        /* Input YAML schema documents */
        #[arg(short = 'f', long = "files", value_name = "FILE", required = true)]
        files: Vec<PathBuf>,

        /* Include directories searched for imported documents */
        #[arg(short = 'I', long = "include-dir", value_name = "DIR")]
        include_dirs: Vec<PathBuf>,

        /* Report format */
        #[arg(long = "format", value_enum, default_value = "yaml")]
        format: ReportFormat,

        /* Output file; stdout when omitted */
        #[arg(short = 'o', long = "output", value_name = "PATH")]
        output: Option<PathBuf>,

        /* Enable verbose output */
        #[arg(short = 'v', long = "verbose")]
        verbose: bool,
    },
}

#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, ValueEnum, Debug)]
enum BackendKind {
    /* Accessor classes over the raw record bytes */
    Native,
    /* Scripting-runtime wrappers around the accessor classes */
    Binding,
    /* Storage-format datasets, readers and writers */
    Schema,
    /* Converter keyed by numeric type id and version */
    Dispatch,
    /* Converter keyed by hashed type name */
    #[value(name = "dispatch-hash")]
    DispatchHash,
}

impl From<BackendKind> for cmds::codegen::Backend {
    fn from(kind: BackendKind) -> Self {
        match kind {
            BackendKind::Native => cmds::codegen::Backend::Native,
            BackendKind::Binding => cmds::codegen::Backend::Binding,
            BackendKind::Schema => cmds::codegen::Backend::Schema,
            BackendKind::Dispatch => cmds::codegen::Backend::Dispatch,
            BackendKind::DispatchHash => cmds::codegen::Backend::DispatchHash,
        }
    }
}

#[derive(Copy, Clone, PartialEq, Eq, ValueEnum, Debug)]
enum ReportFormat {
    Yaml,
    Json,
}

impl From<ReportFormat> for cmds::dump::Format {
    fn from(format: ReportFormat) -> Self {
        match format {
            ReportFormat::Yaml => cmds::dump::Format::Yaml,
            ReportFormat::Json => cmds::dump::Format::Json,
        }
    }
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Codegen {
            files,
            include_dirs,
            backend,
            decl,
            def,
            include_prefix,
            top_namespace,
            interface_ns,
            native_ns,
            ignore_type_ids,
            dump_schema,
            verbose,
        } => {
            init_tracing(verbose);
            let settings = cmds::codegen::Settings {
                backend: backend.into(),
                decl,
                def,
                include_prefix,
                top_namespace,
                interface_ns,
                native_ns,
                ignored_type_ids: ignore_type_ids,
                dump_schema,
            };
            cmds::codegen::run(files, include_dirs, settings, verbose)?;
        }

        Commands::Dump {
            files,
            include_dirs,
            format,
            output,
            verbose,
        } => {
            init_tracing(verbose);
            cmds::dump::run(files, include_dirs, format.into(), output, verbose)?;
        }
    }

    Ok(())
}
