// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use {
    crate::{config::PackConfig, error::Result, inspect, logging, packing},
    clap::{value_parser, Arg, ArgAction, ArgMatches, Command},
    std::path::PathBuf,
};

const PACK_ABOUT: &str = "\
Inline Python packages into a single Python source file.

Each PACKAGE is either a path to a package directory (a directory with an
__init__.py) or the importable name of a package. Names are searched for in
--search-path directories, then PYTHONPATH, then by asking the --python
interpreter.

Importing the emitted file behaves like importing the inlined packages. With
a single package, or with --default-pkg, importing the file under its own
name yields the default package.
";

const INSPECT_ABOUT: &str = "\
Print the contents of a file produced by `pyinline pack`.

The registry of the file is validated and every module is decoded. Malformed
files exit with status 4.
";

fn pack_command() -> Command {
    Command::new("pack")
        .about("Inline Python packages into a single file")
        .long_about(PACK_ABOUT)
        .arg(
            Arg::new("packages")
                .value_name("PACKAGE")
                .action(ArgAction::Append)
                .required(true)
                .help("Package directory or package name to inline"),
        )
        .arg(
            Arg::new("outfile")
                .short('o')
                .long("outfile")
                .value_name("PATH")
                .value_parser(value_parser!(PathBuf))
                .help("File to write (default: stdout)"),
        )
        .arg(
            Arg::new("default_package")
                .short('d')
                .long("default-pkg")
                .value_name("PACKAGE")
                .help("Package resolved when the emitted file is imported by its own name"),
        )
        .arg(
            Arg::new("no_default_package")
                .long("no-default-pkg")
                .action(ArgAction::SetTrue)
                .help("Don't resolve the emitted file's own name to a package"),
        )
        .arg(
            Arg::new("runmain")
                .short('r')
                .long("runmain")
                .action(ArgAction::SetTrue)
                .help("Run the package's __main__.py when the emitted file is executed"),
        )
        .arg(
            Arg::new("set_except")
                .long("set-except")
                .action(ArgAction::SetTrue)
                .conflicts_with("no_except")
                .help("Always install the exception hook showing inlined source"),
        )
        .arg(
            Arg::new("no_except")
                .long("no-except")
                .action(ArgAction::SetTrue)
                .help("Never install the exception hook"),
        )
        .arg(
            Arg::new("tag")
                .long("tag")
                .action(ArgAction::SetTrue)
                .help("Precede every module in the blob with a marker naming its file"),
        )
        .arg(
            Arg::new("search_path")
                .long("search-path")
                .value_name("DIR")
                .action(ArgAction::Append)
                .value_parser(value_parser!(PathBuf))
                .help("Directory to search for packages given by name"),
        )
        .arg(
            Arg::new("no_pythonpath")
                .long("no-pythonpath")
                .action(ArgAction::SetTrue)
                .help("Don't search PYTHONPATH for packages"),
        )
        .arg(
            Arg::new("python")
                .long("python")
                .value_name("EXE")
                .value_parser(value_parser!(PathBuf))
                .help("Python interpreter used to find installed packages"),
        )
}

fn inspect_command() -> Command {
    Command::new("inspect")
        .about("Describe a file produced by `pyinline pack`")
        .long_about(INSPECT_ABOUT)
        .arg(
            Arg::new("artifact")
                .value_name("FILE")
                .required(true)
                .value_parser(value_parser!(PathBuf))
                .help("File to inspect"),
        )
        .arg(
            Arg::new("source")
                .long("source")
                .value_name("MODULE")
                .help("Print the source of a module"),
        )
        .arg(
            Arg::new("json")
                .long("json")
                .action(ArgAction::SetTrue)
                .conflicts_with("source")
                .help("Print the listing as JSON"),
        )
}

pub fn command() -> Command {
    Command::new("pyinline")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Inline Python packages into a single source file")
        .subcommand_required(true)
        .arg_required_else_help(true)
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .action(ArgAction::Count)
                .global(true)
                .help("Increase logging verbosity. Can be specified multiple times"),
        )
        .subcommand(pack_command())
        .subcommand(inspect_command())
}

fn command_pack(args: &ArgMatches) -> Result<()> {
    let config = PackConfig::from_args(args);

    packing::pack(&config)
}

fn command_inspect(args: &ArgMatches) -> Result<()> {
    let path = args
        .get_one::<PathBuf>("artifact")
        .ok_or_else(|| crate::error::PackError::config("FILE is required"))?;

    inspect::inspect(
        path,
        args.get_one::<String>("source").map(|s| s.as_str()),
        args.get_flag("json"),
    )
}

/// Parse process arguments and run the requested command.
///
/// Argument errors terminate the process with status 2.
pub fn run_cli() -> Result<()> {
    let matches = command().get_matches();

    let (name, args) = match matches.subcommand() {
        Some(subcommand) => subcommand,
        None => unreachable!("subcommand is required"),
    };

    logging::init_logging(matches.get_count("verbose").max(args.get_count("verbose")));

    match name {
        "pack" => command_pack(args),
        "inspect" => command_inspect(args),
        _ => unreachable!("unhandled subcommand: {}", name),
    }
}
