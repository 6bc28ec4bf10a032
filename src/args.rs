use std::env;
use std::path::PathBuf;

const DEFAULT_REPLAY_TIMEOUT_SECS: u64 = 10;

#[derive(Debug, Clone, PartialEq)]
pub enum Mode {
    /// One-shot match of a single frame file
    Match(PathBuf),
    /// Run the detection loop over a directory of frames with a dry-run key sink
    Replay(PathBuf),
}

#[derive(Debug, PartialEq)]
pub struct Args {
    pub mode: Mode,
    pub config_dir: Option<PathBuf>,
    pub debug_mode: bool,
    pub timeout_secs: u64,
}

impl Args {
    pub fn parse() -> Option<Self> {
        let args: Vec<String> = env::args().skip(1).collect();
        Self::parse_from(&args)
    }

    /// Parse flags (program name already stripped). Prints help or an
    /// error and returns `None` when the program should exit.
    pub fn parse_from(args: &[String]) -> Option<Self> {
        let mut mode: Option<Mode> = None;
        let mut config_dir: Option<PathBuf> = None;
        let mut debug_mode = false;
        let mut timeout_secs = DEFAULT_REPLAY_TIMEOUT_SECS;

        let mut iter = args.iter();
        while let Some(arg) = iter.next() {
            if arg == "--help" || arg == "-h" {
                print_help();
                return None;
            } else if arg == "--version" || arg == "-v" {
                println!(
                    "Spell Trigger v{} ({})",
                    env!("APP_VERSION_DISPLAY"),
                    env!("APP_BUILD_YEAR")
                );
                return None;
            } else if arg == "--debug" {
                debug_mode = true;
            } else if arg == "--match" || arg == "--replay" || arg == "--config" {
                let Some(value) = iter.next() else {
                    eprintln!("❌ {} needs a path", arg);
                    return None;
                };
                let path = PathBuf::from(value);
                match arg.as_str() {
                    "--match" => mode = Some(Mode::Match(path)),
                    "--replay" => mode = Some(Mode::Replay(path)),
                    _ => config_dir = Some(path),
                }
            } else if let Some(val) = arg.strip_prefix("--timeout=") {
                match val.parse::<u64>() {
                    Ok(secs) => timeout_secs = secs,
                    Err(_) => {
                        eprintln!("❌ Invalid timeout value: {}", val);
                        return None;
                    }
                }
            } else {
                eprintln!("❌ Unknown argument: {}", arg);
                print_help();
                return None;
            }
        }

        let Some(mode) = mode else {
            eprintln!("❌ Nothing to do: pass --match or --replay");
            print_help();
            return None;
        };

        Some(Args {
            mode,
            config_dir,
            debug_mode,
            timeout_secs,
        })
    }
}

fn print_help() {
    println!("🎯 Spell Trigger");
    println!();
    println!("USAGE:");
    println!("    spell-trigger [FLAGS]");
    println!();
    println!("FLAGS:");
    println!("    --match <frame.png>  Match one frame against the saved templates and print the result");
    println!("    --replay <dir>       Run detection over the PNG frames in <dir>, logging key presses");
    println!("    --timeout=N          Stop a replay after N seconds (default: 10)");
    println!("    --config <dir>       Settings directory (default: ~/.spell-trigger)");
    println!("    --debug              Enable debug logging");
    println!("    --help, -h           Show this help message");
    println!("    --version, -v        Show version information");
    println!();
    println!("EXAMPLES:");
    println!("    spell-trigger --match capture.png");
    println!("    spell-trigger --replay ./frames --timeout=30 --debug");
}
