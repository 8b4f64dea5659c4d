//! # mqsub: qsub with an email when the job is done
//!
//! Usage:
//!   mqsub job.sh                         # submit, then watch in the background
//!   mqsub -c ~/mqsub.toml -l walltime=1:00:00 job.sh
//!   mqsub --verbose -- -N name job.sh    # everything after `--` goes to qsub
//!
//! Only `-c/--config`, `--config=FILE`, `--verbose` and `-h/--help` are read
//! here; every other argument reaches `qsub` unchanged and in order.

use std::path::PathBuf;
use std::process::ExitCode;

use mqsub_core::config::MqsubConfig;
use mqsub_core::error::MqsubError;
use mqsub_pbs::Qsub;

const USAGE: &str = "\
Usage: mqsub [MQSUB_OPTIONS] [QSUB_OPTIONS] <script>

Submit a PBS job with qsub and get an email when it finishes.

MQSUB_OPTIONS:
  -c, --config FILE    Configuration file (default: mqsub.toml)
      --verbose        Debug logging on stderr
  -h, --help           Show this help message
  --                   Stop reading mqsub options

QSUB_OPTIONS:
  All other arguments are passed to qsub unchanged.";

/// Exit code when `qsub` itself cannot be started.
const EXIT_NOT_RUNNABLE: u8 = 127;

/// Our own options, split from the pass-through `qsub` arguments.
#[derive(Debug, Default, PartialEq, Eq)]
struct Invocation {
    config: Option<PathBuf>,
    verbose: bool,
    help: bool,
    qsub_args: Vec<String>,
}

/// Split argv (without the program name) into mqsub options and qsub args.
fn split_args<I>(args: I) -> Result<Invocation, String>
where
    I: IntoIterator<Item = String>,
{
    let mut inv = Invocation::default();
    let mut args = args.into_iter();

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "-c" | "--config" => {
                let value = args
                    .next()
                    .ok_or_else(|| format!("{arg} requires a value"))?;
                inv.config = Some(PathBuf::from(value));
            }
            "--verbose" => inv.verbose = true,
            "-h" | "--help" => inv.help = true,
            "--" => {
                // qsub has its own meaning for `--`, so it is forwarded too.
                inv.qsub_args.push(arg);
                inv.qsub_args.extend(args.by_ref());
            }
            _ => match arg.strip_prefix("--config=") {
                Some("") => return Err("--config requires a value".into()),
                Some(value) => inv.config = Some(PathBuf::from(value)),
                None => inv.qsub_args.push(arg),
            },
        }
    }
    Ok(inv)
}

/// qsub's exit status as our own; out-of-range values become 1.
fn exit_byte(code: i32) -> u8 {
    u8::try_from(code).unwrap_or(1)
}

#[tokio::main]
async fn main() -> ExitCode {
    let inv = match split_args(std::env::args().skip(1)) {
        Ok(inv) => inv,
        Err(msg) => {
            eprintln!("mqsub: {msg}\n\n{USAGE}");
            return ExitCode::from(2);
        }
    };
    if inv.help {
        println!("{USAGE}");
        return ExitCode::SUCCESS;
    }
    if inv.qsub_args.is_empty() {
        eprintln!("mqsub: no qsub arguments given\n\n{USAGE}");
        return ExitCode::from(2);
    }

    mqsub_core::logging::init_terminal(inv.verbose);

    match run(inv).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("mqsub: {e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(inv: Invocation) -> anyhow::Result<ExitCode> {
    let config_path = inv.config.unwrap_or_else(MqsubConfig::default_path);
    // Nothing is submitted with a broken config.
    let config = MqsubConfig::load_from(&config_path)?;

    let qsub = Qsub::from_config(&config);
    let submission = match qsub.submit(&inv.qsub_args).await {
        Ok(submission) => submission,
        Err(e @ MqsubError::Submission { .. }) => {
            let code = e.exit_code();
            match code {
                // qsub exited 0 but printed no job id: nothing can be watched.
                Some(0) => {
                    eprintln!("mqsub: {e}");
                    eprintln!("mqsub: the job may have been submitted but will not be monitored");
                    return Ok(ExitCode::FAILURE);
                }
                Some(code) => return Ok(ExitCode::from(exit_byte(code))),
                None => {
                    eprintln!("mqsub: {e}");
                    return Ok(ExitCode::from(EXIT_NOT_RUNNABLE));
                }
            }
        }
        Err(e) => return Err(e.into()),
    };

    let job_id = &submission.job_id;
    match mqsub_scheduler::spawn_watcher(&config, &config_path, job_id, submission.submitted_at) {
        Ok(_) => {
            eprintln!("mqsub: watching job {job_id}; an email goes to {} when it finishes", config.recipient_email);
        }
        Err(e) => {
            tracing::warn!(job_id = %job_id, "⚠️ {e}");
            eprintln!("mqsub: job {job_id} was submitted but is not being monitored");
        }
    }
    Ok(ExitCode::SUCCESS)
}
