//! Replays a memory-access trace against the cache model and reports the
//! hit/miss/eviction totals on stdout.

use std::{
    env,
    fs::File,
    io::{BufRead, BufReader},
    path::PathBuf,
    process,
};

use argh::FromArgs;
use cache::Cache;
use snafu::{Report, ResultExt as _, Whatever, ensure_whatever};

mod trace;

/// Replay a Valgrind-style memory trace against a set-associative LRU cache.
#[derive(Debug, FromArgs)]
struct Args {
    /// number of set index bits (the cache has 2^s sets)
    #[argh(option, short = 's')]
    set_bits: u32,
    /// number of lines per set
    #[argh(option, short = 'E')]
    lines_per_set: usize,
    /// number of block offset bits
    #[argh(option, short = 'b')]
    block_bits: u32,
    /// trace file to replay
    #[argh(option, short = 't')]
    trace: PathBuf,
    /// echo each access and its outcome
    #[argh(switch, short = 'v')]
    verbose: bool,
}

fn main() {
    env_logger::init();
    let args = parse_args();

    if let Err(err) = run(&args) {
        eprintln!("{}", Report::from_error(err));
        process::exit(1);
    }
}

/// Parses the command line, honoring `-h` as a usage request.
///
/// argh only spells its help switch `--help`, while existing trace
/// consumers invoke `-h`; the rewrite maps one onto the other before
/// parsing. Usage goes to stdout with exit 0, bad flags to stderr with
/// exit 1, as `argh::from_env` would do.
fn parse_args() -> Args {
    let argv = rewrite_short_help(env::args());
    let argv: Vec<&str> = argv.iter().map(String::as_str).collect();
    assert!(!argv.is_empty(), "argv holds the command name");
    match Args::from_args(&argv[..1], &argv[1..]) {
        Ok(args) => args,
        Err(exit) => match exit.status {
            Ok(()) => {
                println!("{}", exit.output);
                process::exit(0);
            }
            Err(()) => {
                eprintln!("{}", exit.output);
                process::exit(1);
            }
        },
    }
}

fn rewrite_short_help(argv: impl IntoIterator<Item = String>) -> Vec<String> {
    argv.into_iter()
        .map(|arg| if arg == "-h" { "--help".to_owned() } else { arg })
        .collect()
}

fn run(args: &Args) -> Result<(), Whatever> {
    ensure_whatever!(
        args.lines_per_set > 0,
        "cache must have at least one line per set"
    );
    ensure_whatever!(
        args.set_bits + args.block_bits < u64::BITS,
        "set index and block offset bits must leave room for a tag in a 64-bit address"
    );

    let file = File::open(&args.trace)
        .with_whatever_context(|_| format!("failed to open trace file {}", args.trace.display()))?;

    let mut cache = Cache::new(args.set_bits, args.lines_per_set, args.block_bits);
    replay(&mut cache, BufReader::new(file), args.verbose)?;
    println!("{}", cache.stats());
    Ok(())
}

fn replay(cache: &mut Cache, reader: impl BufRead, verbose: bool) -> Result<(), Whatever> {
    for (index, line) in reader.lines().enumerate() {
        let line = line.whatever_context("failed to read trace file")?;
        let event = trace::parse_line(&line)
            .with_whatever_context(|_| format!("invalid trace line {}", index + 1))?;

        let result = cache.access(event.kind, event.addr);
        if verbose {
            match result.second {
                Some(second) => {
                    println!("{} {:x} {} {}", event.kind, event.addr, result.first, second);
                }
                None => println!("{} {:x} {}", event.kind, event.addr, result.first),
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;

    #[test]
    fn test_replay_direct_mapped_trace() {
        let mut cache = Cache::new(0, 1, 0);
        replay(&mut cache, Cursor::new("L 0\nL 0\nS 0\n"), false).unwrap();
        let stats = cache.stats();
        assert_eq!((stats.hits, stats.misses, stats.evictions), (2, 1, 0));
    }

    #[test]
    fn test_replay_counts_modify_as_two_lookups() {
        let mut cache = Cache::new(0, 1, 0);
        replay(&mut cache, Cursor::new(" M 20,8\n"), false).unwrap();
        let stats = cache.stats();
        assert_eq!((stats.hits, stats.misses, stats.evictions), (1, 1, 0));
    }

    #[test]
    fn test_replay_two_way_set_fills_then_evicts() {
        let mut cache = Cache::new(0, 2, 0);
        replay(&mut cache, Cursor::new("L 0,1\nL 10,1\nL 20,1\n"), false).unwrap();
        let stats = cache.stats();
        assert_eq!((stats.hits, stats.misses, stats.evictions), (0, 3, 1));
    }

    #[test]
    fn test_short_help_becomes_a_usage_request() {
        let argv = rewrite_short_help(
            ["cachesim", "-h"].map(str::to_owned),
        );
        assert_eq!(argv, ["cachesim", "--help"]);

        let exit = Args::from_args(&["cachesim"], &["--help"]).unwrap_err();
        assert_eq!(exit.status, Ok(()));
    }

    #[test]
    fn test_other_arguments_pass_through_unchanged() {
        let argv = rewrite_short_help(
            ["cachesim", "-s", "4", "-E", "1", "-b", "4", "-t", "t.trace", "-v"].map(str::to_owned),
        );
        let argv: Vec<&str> = argv.iter().map(String::as_str).collect();
        let args = Args::from_args(&["cachesim"], &argv[1..]).unwrap();
        assert_eq!((args.set_bits, args.lines_per_set, args.block_bits), (4, 1, 4));
        assert!(args.verbose);
    }

    #[test]
    fn test_unknown_flag_is_an_error_exit() {
        let exit = Args::from_args(&["cachesim"], &["-q"]).unwrap_err();
        assert_eq!(exit.status, Err(()));
    }

    #[test]
    fn test_replay_names_the_bad_line() {
        let mut cache = Cache::new(4, 1, 4);
        let err = replay(&mut cache, Cursor::new("L 10,1\nX nope\n"), false).unwrap_err();
        assert!(err.to_string().contains("line 2"));
    }
}
