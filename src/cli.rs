use clap::{Arg, ArgAction, ArgMatches, Command};
use docklab::logs::LogLevel;
use docklab::templates::SortBy;
use std::path::PathBuf;

pub(crate) enum SettingsAction {
    Show,
    Export { out: Option<PathBuf> },
    Import { file: PathBuf },
    Reset,
}

pub(crate) enum Action {
    Templates {
        search: Option<String>,
        category: Option<String>,
        sort_by: SortBy,
    },
    Labs {
        recent: usize,
    },
    Compose {
        file: PathBuf,
        create: Option<String>,
    },
    Install {
        template: String,
        start: bool,
    },
    Exec {
        template: String,
        container: Option<String>,
    },
    Logs {
        template: String,
        level: Option<LogLevel>,
        search: Option<String>,
        follow: u32,
    },
    Settings(SettingsAction),
}

pub struct Config {
    pub api: Option<String>,
    pub fast: bool,
    pub state_dir: PathBuf,
    pub(crate) action: Action,
}

fn string(matches: &ArgMatches, id: &str) -> Option<String> {
    matches.get_one::<String>(id).cloned()
}

fn template_arg(matches: &ArgMatches) -> String {
    string(matches, "template").unwrap_or_default()
}

impl From<&ArgMatches> for SettingsAction {
    fn from(matches: &ArgMatches) -> Self {
        match matches.subcommand() {
            Some(("export", sub)) => SettingsAction::Export {
                out: sub.get_one::<PathBuf>("out").cloned(),
            },
            Some(("import", sub)) => SettingsAction::Import {
                file: sub.get_one::<PathBuf>("file").cloned().unwrap_or_default(),
            },
            Some(("reset", _)) => SettingsAction::Reset,
            _ => SettingsAction::Show,
        }
    }
}

impl From<ArgMatches> for Config {
    fn from(matches: ArgMatches) -> Self {
        let action = match matches.subcommand() {
            Some(("labs", sub)) => Action::Labs {
                recent: sub.get_one::<usize>("recent").copied().unwrap_or(3),
            },
            Some(("compose", sub)) => Action::Compose {
                file: sub.get_one::<PathBuf>("file").cloned().unwrap_or_default(),
                create: string(sub, "create"),
            },
            Some(("install", sub)) => Action::Install {
                template: template_arg(sub),
                start: sub.get_flag("start"),
            },
            Some(("exec", sub)) => Action::Exec {
                template: template_arg(sub),
                container: string(sub, "container"),
            },
            Some(("logs", sub)) => Action::Logs {
                template: template_arg(sub),
                level: sub
                    .get_one::<String>("level")
                    .and_then(|l| LogLevel::parse(l)),
                search: string(sub, "search"),
                follow: sub.get_one::<u32>("follow").copied().unwrap_or(0),
            },
            Some(("settings", sub)) => Action::Settings(sub.into()),
            Some(("templates", sub)) => Action::Templates {
                search: string(sub, "search"),
                category: string(sub, "category"),
                sort_by: match sub.get_one::<String>("sort").map(String::as_str) {
                    Some("category") => SortBy::Category,
                    _ => SortBy::Name,
                },
            },
            _ => Action::Templates {
                search: None,
                category: None,
                sort_by: SortBy::Name,
            },
        };
        Config {
            api: string(&matches, "api"),
            fast: matches.get_flag("fast"),
            state_dir: matches
                .get_one::<PathBuf>("state_dir")
                .cloned()
                .unwrap_or_else(|| PathBuf::from(".docklab")),
            action,
        }
    }
}

fn template_positional() -> Arg {
    Arg::new("template")
        .help("Template id or name, e.g. nginx-basic")
        .value_name("TEMPLATE")
        .required(true)
}

pub(crate) fn configure_cli() -> Config {
    let matches = Command::new("docklab")
        .version(env!("CARGO_PKG_VERSION"))
        .about("simulated docker labs: install templates, start and stop labs, exec and tail logs")
        .subcommand_required(true)
        .arg(
            Arg::new("api")
                .long("api")
                .env("DOCKLAB_API_URL")
                .value_name("URL")
                .help("Base URL of a lab API serving /api/lab and /api/lab/templates")
                .global(true),
        )
        .arg(
            Arg::new("fast")
                .long("fast")
                .help("Skip all simulated delays")
                .action(ArgAction::SetTrue)
                .global(true),
        )
        .arg(
            Arg::new("state_dir")
                .long("state-dir")
                .env("DOCKLAB_STATE_DIR")
                .value_name("DIR")
                .help("Where settings are persisted (default: .docklab)")
                .value_parser(clap::value_parser!(PathBuf))
                .global(true),
        )
        .subcommand(
            Command::new("templates")
                .about("Browse the template catalog")
                .arg(Arg::new("search").short('s').long("search").value_name("TEXT"))
                .arg(Arg::new("category").short('c').long("category").value_name("CATEGORY"))
                .arg(
                    Arg::new("sort")
                        .long("sort")
                        .value_parser(["name", "category"])
                        .default_value("name"),
                ),
        )
        .subcommand(
            Command::new("labs")
                .about("List labs with dashboard stats")
                .arg(
                    Arg::new("recent")
                        .long("recent")
                        .value_name("COUNT")
                        .default_value("3")
                        .value_parser(clap::value_parser!(usize)),
                ),
        )
        .subcommand(
            Command::new("compose")
                .about("Render compose text from a JSON list of service descriptors")
                .arg(
                    Arg::new("file")
                        .value_name("FILE")
                        .required(true)
                        .value_parser(clap::value_parser!(PathBuf)),
                )
                .arg(
                    Arg::new("create")
                        .long("create")
                        .value_name("NAME")
                        .help("Also create a custom lab from the generated text"),
                ),
        )
        .subcommand(
            Command::new("install")
                .about("Install a template and stream its build log (Ctrl-C cancels)")
                .arg(template_positional())
                .arg(
                    Arg::new("start")
                        .long("start")
                        .help("Start the lab once installed")
                        .action(ArgAction::SetTrue),
                ),
        )
        .subcommand(
            Command::new("exec")
                .about("Open a shell on a container of a freshly installed lab")
                .arg(template_positional())
                .arg(
                    Arg::new("container")
                        .long("container")
                        .value_name("NAME")
                        .help("Container name (default: the first one)"),
                ),
        )
        .subcommand(
            Command::new("logs")
                .about("Show simulated container logs of a lab")
                .arg(template_positional())
                .arg(
                    Arg::new("level")
                        .short('l')
                        .long("level")
                        .value_parser(["info", "warn", "error", "debug"]),
                )
                .arg(Arg::new("search").short('s').long("search").value_name("TEXT"))
                .arg(
                    Arg::new("follow")
                        .short('f')
                        .long("follow")
                        .value_name("TICKS")
                        .help("Keep tailing for N refresh ticks")
                        .num_args(0..=1)
                        .default_missing_value("10")
                        .value_parser(clap::value_parser!(u32)),
                ),
        )
        .subcommand(
            Command::new("settings")
                .about("Show, export, import or reset settings")
                .subcommand(Command::new("show"))
                .subcommand(
                    Command::new("export").arg(
                        Arg::new("out")
                            .long("out")
                            .value_name("FILE")
                            .num_args(0..=1)
                            .default_missing_value(docklab::config::EXPORT_FILE)
                            .value_parser(clap::value_parser!(PathBuf)),
                    ),
                )
                .subcommand(
                    Command::new("import").arg(
                        Arg::new("file")
                            .value_name("FILE")
                            .required(true)
                            .value_parser(clap::value_parser!(PathBuf)),
                    ),
                )
                .subcommand(Command::new("reset")),
        )
        .get_matches();
    matches.into()
}
