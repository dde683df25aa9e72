//! Kernel configuration.
//!
//! The kernel reads its command line from the arguments of the process:
//!
//! | Option      | Effect                                              |
//! |-------------|-----------------------------------------------------|
//! | `-mlfqs`    | Use the multi-level feedback queue scheduler.       |
//! | `-q`        | Silence `info!`, `warning!` and `debug!` messages.  |
//! | `-freq=N`   | Interrupt `N` times per second.                     |
//!
//! Any other word selects the test cases to run. Unknown options are
//! reported and ignored.
use crate::{
    KernelError,
    timer::{DEFAULT_TIMER_FREQ, MAX_TIMER_FREQ, MIN_TIMER_FREQ},
};
use std::sync::OnceLock;

/// The parsed kernel command line.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct KernelArgs {
    /// `-mlfqs` was given.
    pub mlfqs: bool,
    /// `-q` was given.
    pub quiet: bool,
    /// Value of `-freq=`.
    pub timer_freq: Option<u32>,
    /// Test case filters.
    pub filters: Vec<String>,
    /// Options that were not recognized.
    pub unknown: Vec<String>,
}

impl KernelArgs {
    /// Parse the kernel command line.
    pub fn parse<I, S>(args: I) -> Result<Self, KernelError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut parsed = Self::default();
        for arg in args.into_iter().map(Into::into) {
            match arg.as_str() {
                "-mlfqs" => parsed.mlfqs = true,
                "-q" => parsed.quiet = true,
                opt => match opt.strip_prefix("-freq=") {
                    Some(freq) => {
                        let freq = freq
                            .parse::<u32>()
                            .map_err(|_| KernelError::InvalidArgument)?;
                        parsed.timer_freq = Some(freq);
                    }
                    None if opt.starts_with('-') => parsed.unknown.push(arg),
                    None => parsed.filters.push(arg),
                },
            }
        }
        Ok(parsed)
    }
}

static CMDLINE: OnceLock<KernelArgs> = OnceLock::new();

/// Record the command line of the kernel.
pub(crate) fn set_cmdline(args: KernelArgs) {
    let _ = CMDLINE.set(args);
}

/// The kernel command line.
///
/// Empty if the kernel was not started through [`rust_main`].
///
/// [`rust_main`]: crate::rust_main
pub fn cmdline() -> &'static KernelArgs {
    static EMPTY: KernelArgs = KernelArgs {
        mlfqs: false,
        quiet: false,
        timer_freq: None,
        filters: Vec::new(),
        unknown: Vec::new(),
    };
    CMDLINE.get().unwrap_or(&EMPTY)
}

/// Configuration of the booted kernel, if any.
pub fn booted() -> Option<Config> {
    crate::kernel::try_kernel().map(|kernel| kernel.config)
}

/// Configuration of the kernel.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Config {
    /// Timer interrupts per second.
    pub timer_freq: u32,
    /// Whether the MLFQS scheduler is active.
    pub mlfqs: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            timer_freq: DEFAULT_TIMER_FREQ,
            mlfqs: false,
        }
    }
}

impl Config {
    /// Configuration given by the command line.
    pub fn from_args(args: &KernelArgs) -> Self {
        Self {
            timer_freq: args.timer_freq.unwrap_or(DEFAULT_TIMER_FREQ),
            mlfqs: args.mlfqs,
        }
    }

    /// Check that the configuration is supported.
    pub fn validate(&self) -> Result<(), KernelError> {
        if (MIN_TIMER_FREQ..=MAX_TIMER_FREQ).contains(&self.timer_freq) {
            Ok(())
        } else {
            Err(KernelError::InvalidArgument)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_options_and_filters() {
        let args = KernelArgs::parse(["-mlfqs", "-q", "-freq=250", "lock::donate", "sema"]).unwrap();
        assert!(args.mlfqs);
        assert!(args.quiet);
        assert_eq!(args.timer_freq, Some(250));
        assert_eq!(args.filters, ["lock::donate", "sema"]);
        assert!(args.unknown.is_empty());
    }

    #[test]
    fn unknown_options_are_collected() {
        let args = KernelArgs::parse(["-v", "alarm"]).unwrap();
        assert_eq!(args.unknown, ["-v"]);
        assert_eq!(args.filters, ["alarm"]);
        assert!(!args.mlfqs);
    }

    #[test]
    fn bad_frequency_is_rejected() {
        assert_eq!(
            KernelArgs::parse(["-freq=fast"]),
            Err(KernelError::InvalidArgument)
        );
        assert_eq!(
            KernelArgs::parse(["-freq=-1"]),
            Err(KernelError::InvalidArgument)
        );
    }

    #[test]
    fn config_bounds() {
        assert_eq!(Config::default().validate(), Ok(()));
        let args = KernelArgs::parse(["-freq=1000"]).unwrap();
        assert_eq!(Config::from_args(&args).validate(), Ok(()));
        for timer_freq in [0, MIN_TIMER_FREQ - 1, MAX_TIMER_FREQ + 1] {
            let config = Config {
                timer_freq,
                mlfqs: false,
            };
            assert_eq!(config.validate(), Err(KernelError::InvalidArgument));
        }
    }

    #[test]
    fn empty_command_line() {
        let args = KernelArgs::parse(Vec::<String>::new()).unwrap();
        assert_eq!(args, KernelArgs::default());
        assert_eq!(Config::from_args(&args), Config::default());
    }
}
