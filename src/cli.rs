// src/cli.rs
use anyhow::Result;
use clap::{Arg, ArgAction, ArgMatches, Command};
use std::{env, path::PathBuf};

use crate::core::config::{Environment, Operation, RecipeBook, ENVIRONMENT_FILE, RECIPE_FILE};
use crate::core::dispatch::Dispatcher;
use crate::infra::command::{CommandRunner, SystemRunner};
use crate::infra::t;
use crate::reporting::console;

/// Parsed command line.
/// 解析后的命令行。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CliArgs {
    pub root: PathBuf,
    pub config: Option<PathBuf>,
    pub env: Option<PathBuf>,
    pub list: bool,
    pub recipe: Option<String>,
    pub program_args: Vec<String>,
}

impl CliArgs {
    fn from_matches(matches: &ArgMatches) -> Self {
        Self {
            root: matches
                .get_one::<PathBuf>("root")
                .cloned()
                .unwrap_or_else(|| PathBuf::from(".")),
            config: matches.get_one::<PathBuf>("config").cloned(),
            env: matches.get_one::<PathBuf>("env").cloned(),
            list: matches.get_flag("list"),
            recipe: matches.get_one::<String>("recipe").cloned(),
            program_args: matches
                .get_many::<String>("program-args")
                .map(|values| values.cloned().collect())
                .unwrap_or_default(),
        }
    }

    pub fn config_path(&self) -> PathBuf {
        self.config
            .clone()
            .unwrap_or_else(|| self.root.join(RECIPE_FILE))
    }

    pub fn env_path(&self) -> PathBuf {
        self.env
            .clone()
            .unwrap_or_else(|| self.root.join(ENVIRONMENT_FILE))
    }
}

/// Pre-parses the command line arguments to find the language setting.
/// This allows i18n to be initialized before the full CLI is built.
/// It looks for `--lang <VALUE>` or `--lang=<VALUE>` before any `--`.
fn pre_parse_language<I: IntoIterator<Item = String>>(args: I) -> Option<String> {
    let mut args = args.into_iter().take_while(|arg| arg != "--");
    while let Some(arg) = args.next() {
        if arg == "--lang" {
            return args.next();
        }
        if let Some(lang) = arg.strip_prefix("--lang=") {
            return Some(lang.to_string());
        }
    }
    None
}

fn build_cli() -> Command {
    Command::new("recipe-runner")
        .version(env!("CARGO_PKG_VERSION"))
        .about(t!("cli_about").to_string())
        .after_help(t!("cli_after_help", ops = Operation::KINDS.join(", ")).to_string())
        .arg(
            Arg::new("root")
                .long("root")
                .help(t!("arg_root").to_string())
                .value_name("DIR")
                .default_value(".")
                .value_parser(clap::value_parser!(PathBuf))
                .action(ArgAction::Set),
        )
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .help(t!("arg_config").to_string())
                .value_name("FILE")
                .value_parser(clap::value_parser!(PathBuf))
                .action(ArgAction::Set),
        )
        .arg(
            Arg::new("env")
                .long("env")
                .help(t!("arg_env").to_string())
                .value_name("FILE")
                .value_parser(clap::value_parser!(PathBuf))
                .action(ArgAction::Set),
        )
        .arg(
            Arg::new("lang")
                .long("lang")
                .help(t!("arg_lang").to_string())
                .value_name("LANGUAGE")
                .action(ArgAction::Set),
        )
        .arg(
            Arg::new("list")
                .short('l')
                .long("list")
                .help(t!("arg_list").to_string())
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("recipe")
                .help(t!("arg_recipe").to_string())
                .value_name("NAME")
                .required_unless_present("list")
                .action(ArgAction::Set),
        )
        .arg(
            Arg::new("program-args")
                .help(t!("arg_program_args").to_string())
                .value_name("PROGRAM_ARGS")
                .num_args(0..)
                .trailing_var_arg(true)
                .allow_hyphen_values(true)
                .action(ArgAction::Append),
        )
}

/// Entry point used by the binary.
pub async fn run() -> Result<()> {
    let language = pre_parse_language(env::args().skip(1));
    crate::init(language.as_deref());

    let matches = build_cli().get_matches();
    execute(CliArgs::from_matches(&matches), &SystemRunner).await
}

/// Loads the recipe and environment files named by `args` and runs the
/// requested recipe with `runner`.
///
/// 加载 `args` 指定的配方文件和环境文件，并使用 `runner` 运行所请求的配方。
pub async fn execute(args: CliArgs, runner: &dyn CommandRunner) -> Result<()> {
    let config_path = args.config_path();
    let book = RecipeBook::load(&config_path)?;

    if args.list {
        console::print_recipe_names(book.names());
        return Ok(());
    }
    let Some(recipe) = args.recipe.as_deref() else {
        anyhow::bail!(t!("no_recipe_given").to_string());
    };

    let environment = Environment::load(&args.env_path())?;
    tracing::debug!(cargo = %environment.cargo, config = %config_path.display(), "configuration loaded");

    Dispatcher::new(&args.root, &environment, runner)?
        .with_program_args(args.program_args.clone())
        .run_recipe(&book, recipe, &config_path)
        .await
}
