use clap::{Arg, ArgAction, Command};
use std::error::Error;
use std::path::{Path, PathBuf};

use cvsr::callbacks::{CallbackBuilder, ServerMessage};
use cvsr::logging::{init_tracing, warn};
use cvsr::{BasicCommand, Config, Session};

fn load_config(path: Option<&String>) -> Result<Config, Box<dyn Error>> {
	let mut config = match path {
		Some(path) => Config::load(Path::new(path))?,
		None => Config::default(),
	};
	config.apply_env();
	Ok(config)
}

fn print_message(message: &ServerMessage) {
	if message.error {
		eprintln!("{}", message.text);
	} else {
		println!("{}", message.text);
	}
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
	let matches = Command::new("cvsr")
		.version("0.1.0")
		.about("CVS client/server protocol client")
		.arg(Arg::new("root").short('d').value_name("CVSROOT").help("Repository location"))
		.arg(Arg::new("config").short('c').long("config").value_name("FILE").help("Config file (.toml or .json5)"))
		.arg(Arg::new("quiet").short('q').action(ArgAction::SetTrue).help("Somewhat quiet"))
		.arg(Arg::new("very-quiet").short('Q').action(ArgAction::SetTrue).help("Really quiet"))
		.arg(Arg::new("dry-run").short('n').action(ArgAction::SetTrue).help("Do not change any files"))
		.arg(Arg::new("read-only").short('r').action(ArgAction::SetTrue).help("Make checked-out files read-only"))
		.arg(
			Arg::new("compress")
				.short('z')
				.value_name("LEVEL")
				.value_parser(clap::value_parser!(u32))
				.help("Compression level"),
		)
		.arg(
			Arg::new("local")
				.short('l')
				.long("local")
				.action(ArgAction::SetTrue)
				.help("Do not descend into subdirectories"),
		)
		.arg(Arg::new("dump-config").long("dump-config").action(ArgAction::SetTrue).help("Print the configuration"))
		.arg(Arg::new("command").required(true).help("Command to run (update, status, ...)"))
		.arg(
			Arg::new("args")
				.action(ArgAction::Append)
				.num_args(0..)
				.allow_hyphen_values(true)
				.trailing_var_arg(true),
		)
		.get_matches();

	init_tracing(None);

	let mut config = load_config(matches.get_one::<String>("config"))?;
	if let Some(root) = matches.get_one::<String>("root") {
		config.cvsroot = Some(root.clone());
	}
	config.global.moderately_quiet |= matches.get_flag("quiet");
	config.global.very_quiet |= matches.get_flag("very-quiet");
	config.global.do_no_changes |= matches.get_flag("dry-run");
	config.global.checked_out_files_read_only |= matches.get_flag("read-only");
	if let Some(level) = matches.get_one::<u32>("compress") {
		config.global.compression_level = *level;
	}

	if matches.get_flag("dump-config") {
		println!("{}", config.to_json()?);
		return Ok(());
	}

	let name = matches.get_one::<String>("command").ok_or("command argument required")?;
	let mut command = BasicCommand::new(name.as_str()).recursive(!matches.get_flag("local"));
	for arg in matches.get_many::<String>("args").into_iter().flatten() {
		if arg.starts_with('-') {
			command = command.option(arg.as_str());
		} else {
			command = command.file(config.local_path.join(PathBuf::from(arg)));
		}
	}

	let mut session = Session::from_config(&config)?;
	session.add_listener(CallbackBuilder::new().on_message(print_message).build());

	let abort = session.abort_handle();
	tokio::spawn(async move {
		if tokio::signal::ctrl_c().await.is_ok() {
			abort.abort();
		}
	});

	let result = session.execute(&command).await;
	if let Err(e) = session.close().await {
		warn!("Closing the connection failed: {}", e);
	}
	result.map_err(|e| Box::new(e) as Box<dyn Error>)
}

// vim: ts=4
