//! Program driver and command-line surface.
//!
//! The binary that wires a concrete interpreter lives with the embedding;
//! everything up to that seam is here: option parsing, profiler lifecycle,
//! catching whatever the target does, and the final report.

use std::env;
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};

use clap::Parser;

use crate::config::{ProfileConfig, TimerMode};
use crate::error::ProfileError;
use crate::profiler::Profiler;

/// Command-line options.
#[derive(Debug, Parser)]
#[command(name = "sightline")]
#[command(about = "A per-line CPU and memory profiler for bytecode interpreters")]
pub struct Options {
    /// Program to be profiled
    pub prog: PathBuf,

    /// File to hold profiler output (default: stdout)
    #[arg(short, long)]
    pub outfile: Option<PathBuf>,

    /// Output profiles every so many seconds
    #[arg(long = "profile-interval", default_value_t = f64::INFINITY)]
    pub profile_interval: f64,

    /// Use wall clock time (default: virtual time)
    #[arg(long)]
    pub wallclock: bool,

    /// Arguments forwarded to the profiled program
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    pub args: Vec<String>,
}

/// Loads and runs the target program under an installed profiler.
///
/// Implementations must call [`Profiler::poll`] at every dispatch boundary
/// and propagate the error if a poll fails.
pub trait Launcher {
    /// Run `prog` with `args` to completion, returning its exit code.
    fn run(
        &mut self,
        profiler: &Profiler,
        prog: &Path,
        args: &[String],
    ) -> Result<i32, ProfileError>;
}

/// Profile one program run end to end. Returns the process exit code.
pub fn run<L: Launcher>(options: &Options, launcher: &mut L) -> i32 {
    if cfg!(not(unix)) {
        println!("sightline requires POSIX signal delivery and does not support this platform.");
        return -1;
    }
    if !options.prog.is_file() {
        println!("could not find input file.");
        return 0;
    }
    let prog = std::path::absolute(&options.prog).unwrap_or_else(|_| options.prog.clone());
    let program_path = prog
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("/"));

    let config = ProfileConfig {
        mode: if options.wallclock {
            TimerMode::Wall
        } else {
            TimerMode::Cpu
        },
        output_path: options.outfile.clone(),
        output_interval_s: options.profile_interval,
        ..ProfileConfig::new(program_path.clone())
    };
    let profiler = match Profiler::install(config) {
        Ok(profiler) => profiler,
        Err(e) => {
            eprintln!("sightline: {e}");
            return 1;
        }
    };

    let exit_code = profiled_run(&profiler, &prog, &program_path, options, launcher);

    // Exit path: the timer is already disarmed; flush exactly once, then
    // release the process-wide root.
    let emitted = profiler.write_report();
    Profiler::uninstall();
    match emitted {
        Ok(true) => exit_code,
        Ok(false) => {
            println!("Program did not run for long enough to profile.");
            exit_code
        }
        Err(e) => {
            eprintln!("sightline: failed to write profile: {e}");
            1
        }
    }
}

/// Run the target with the working directory switched to its own, signals
/// live, and every way out (return, error, panic) funneled into an exit code.
fn profiled_run<L: Launcher>(
    profiler: &Profiler,
    prog: &Path,
    program_path: &Path,
    options: &Options,
    launcher: &mut L,
) -> i32 {
    let original_dir = env::current_dir().ok();
    let _ = env::set_current_dir(program_path);

    let exit_code = match profiler.start() {
        Ok(()) => {
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
                launcher.run(profiler, prog, &options.args)
            }));
            profiler.stop();
            match outcome {
                Ok(Ok(code)) => code,
                Ok(Err(e)) => {
                    // End of run; the report still goes out.
                    eprintln!("sightline: profiled program failed: {e}");
                    0
                }
                Err(_) => 0,
            }
        }
        Err(e) => {
            eprintln!("sightline: {e}");
            1
        }
    };

    if let Some(dir) = original_dir {
        let _ = env::set_current_dir(dir);
    }
    exit_code
}
