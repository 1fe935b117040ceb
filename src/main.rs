use argh::FromArgs;
use log::debug;
use tinysh::{Interpreter, Quoting};

#[derive(FromArgs)]
/// Interactive command interpreter with the builtins exit, echo, type, cd and pwd.
struct Args {
    #[argh(option, default = "tinysh::DEFAULT_PROMPT.to_owned()")]
    /// text printed before every input line.
    prompt: String,

    #[argh(switch)]
    /// let double quotes group words, in addition to single quotes.
    double_quotes: bool,

    #[argh(switch)]
    /// read plain lines from stdin even when it is a terminal.
    no_editor: bool,
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let args: Args = argh::from_env();

    let quoting = if args.double_quotes {
        Quoting::SingleAndDouble
    } else {
        Quoting::SingleOnly
    };
    debug!("starting with quoting {:?}, editor {}", quoting, !args.no_editor);

    let mut sh = Interpreter::default()
        .with_quoting(quoting)
        .with_prompt(args.prompt);
    let code = sh.repl(!args.no_editor)?;
    std::process::exit(code)
}
