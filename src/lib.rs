//! # tickos: the scheduling and synchronization core of a teaching kernel
//!
//! tickos implements the part of an operating system kernel that decides
//! *which thread runs* and *how threads wait for each other*:
//!
//! 1. **[`timer`]**: the tick counter driven by the programmable interval
//!    timer, the sleep queue and the calibrated busy-wait.
//! 2. **[`thread`]**: thread control blocks, the thread state machine, the
//!    priority scheduler and the multi-level feedback queue scheduler.
//! 3. **[`sync`]**: semaphores, locks with priority donation, mutexes and
//!    condition variables.
//!
//! ## The machine
//!
//! tickos runs on top of a hosted operating system. The `abyss` crate
//! simulates the hardware the kernel needs: a single cpu, its interrupt
//! flag, an interrupt controller, an 8254 timer, a serial console and a
//! power switch. Every kernel thread is backed by a host thread, but only
//! the thread that owns the cpu executes; a context switch hands the cpu
//! over.
//!
//! Because there is one cpu, disabling interrupts is enough to keep the
//! running thread on the cpu. All scheduler state lives in one context
//! behind a [`SpinLock`], which disables interrupts while held.
//!
//! ## Implementation Notes
//!
//! Each thread is assigned a stack of [`thread::STACK_SIZE`] bytes.
//! **Avoid declaring large data structures on the stack**; allocate them on
//! the heap with `Box` instead.
//!
//! Violating the contract of a primitive, such as releasing a lock that the
//! caller does not hold, is a kernel bug. The kernel panics, prints a
//! backtrace and powers the machine off.
//!
//! ## Getting Started
//!
//! A kernel binary hands its entry function to [`rust_main`]:
//!
//! ```no_run
//! fn main() {
//!     tickos::rust_main(kernel_main)
//! }
//!
//! fn kernel_main(builder: tickos::SystemConfigurationBuilder) {
//!     builder.boot().expect("Failed to boot the kernel.");
//!     tickos::thread::ThreadBuilder::new("hello").spawn(|| {
//!         tickos::println!("Hello, world!");
//!         tickos::power::shutdown();
//!     });
//! }
//! ```
//!
//! ### Selectively run tests
//!
//! You can run one or more specific test cases by passing their names
//! as arguments to the test runner. For example:
//!
//! ```bash
//! $ cargo run -- lock::donate_one lock::donate_chain
//! ```
//!
//! Options on the same command line configure the kernel: `-mlfqs` selects
//! the multi-level feedback queue scheduler, `-q` silences informational
//! messages and `-freq=N` sets the timer frequency. See [`config`].
//!
//! [`SpinLock`]: sync::SpinLock
#![warn(missing_docs, rustdoc::broken_intra_doc_links)]

#[macro_use]
extern crate abyss;

mod interrupt;
mod kernel;
mod lang;

pub mod config;
pub mod power;
pub mod sync;
pub mod thread;
pub mod timer;

pub use abyss::{MAX_CPU, debug, info, print, println, warning};
use config::{Config, KernelArgs};
use core::sync::atomic::{AtomicU32, Ordering};

/// Enum representing errors that can occur during a kernel operation.
///
/// Each variant corresponds to a specific type of error that might occur
/// during the handling of a kernel operation.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum KernelError {
    /// IO Error. (EIO)
    IOError,
    /// Out of memory. (ENOMEM)
    NoMemory,
    /// Device or resource busy. (EBUSY)
    Busy,
    /// Invalid arguement. (EINVAL)
    InvalidArgument,
}

impl KernelError {
    /// Converts the [`KernelError`] enum into a corresponding `usize` error
    /// code.
    pub fn into_usize(self) -> usize {
        (match self {
            KernelError::IOError => -5isize,
            KernelError::NoMemory => -12,
            KernelError::Busy => -16,
            KernelError::InvalidArgument => -22,
        }) as usize
    }
}

/// The given `isize` does not indicate an [`KernelError`].
#[derive(Debug, Eq, PartialEq)]
pub struct TryFromError {
    e: isize,
}

impl TryFrom<isize> for KernelError {
    type Error = TryFromError;

    fn try_from(value: isize) -> Result<Self, Self::Error> {
        match value {
            -5 => Ok(Self::IOError),
            -12 => Ok(Self::NoMemory),
            -16 => Ok(Self::Busy),
            -22 => Ok(Self::InvalidArgument),
            e => Err(TryFromError { e }),
        }
    }
}

impl From<std::io::Error> for KernelError {
    fn from(e: std::io::Error) -> Self {
        match e.kind() {
            std::io::ErrorKind::InvalidInput => Self::InvalidArgument,
            std::io::ErrorKind::OutOfMemory => Self::NoMemory,
            _ => Self::IOError,
        }
    }
}

/// Panic depth level.
///
/// Used for determining double panic, and notifying drop handlers that panic is
/// in progress.
pub static PANIC_DEPTH: AtomicU32 = AtomicU32::new(0);

/// A builder for system configuration settings.
///
/// The [`SystemConfigurationBuilder`] struct provides an interface for
/// configuring various system-wide settings before initialization. It starts
/// from the kernel command line; the setters override it.
pub struct SystemConfigurationBuilder {
    config: Config,
}

impl SystemConfigurationBuilder {
    /// Sets the number of timer interrupts per second.
    pub fn set_timer_freq(mut self, hz: u32) -> Self {
        self.config.timer_freq = hz;
        self
    }

    /// Selects the multi-level feedback queue scheduler instead of the
    /// priority scheduler.
    pub fn set_mlfqs(mut self, mlfqs: bool) -> Self {
        self.config.mlfqs = mlfqs;
        self
    }

    /// Returns true if the MLFQS scheduler is selected.
    pub fn mlfqs(&self) -> bool {
        self.config.mlfqs
    }

    /// Boot the kernel with this configuration.
    ///
    /// The calling thread becomes the "main" thread of the kernel. On
    /// return, the timer runs, interrupts are enabled and threads can be
    /// spawned.
    ///
    /// # Errors
    ///
    /// - [`KernelError::InvalidArgument`] if the timer frequency is out of
    ///   range.
    /// - [`KernelError::Busy`] if the kernel is already booted.
    /// - [`KernelError::NoMemory`] or [`KernelError::IOError`] if the
    ///   machine cannot create the idle thread.
    pub fn boot(self) -> Result<(), KernelError> {
        self.config.validate()?;
        kernel::boot(self.config)
    }
}

/// The entry of tickos.
///
/// Installs the panic handler, parses the command line and calls `main`
/// with a [`SystemConfigurationBuilder`]. `main` is expected to boot the
/// kernel and start the work of the machine, such as a [`TestDriver`]. When
/// it returns, its thread exits; the machine keeps running until a thread
/// powers it off.
pub fn rust_main(main: fn(SystemConfigurationBuilder)) -> ! {
    lang::panicking::install();

    let args = match KernelArgs::parse(std::env::args().skip(1)) {
        Ok(args) => args,
        Err(e) => {
            println!("Invalid command line: {e:?}");
            power::power_off(1);
        }
    };
    abyss::QUITE.store(args.quiet, Ordering::SeqCst);
    info!(
        "\n\
 _   _      _              \n\
| |_(_) ___| | _____  ___  \n\
| __| |/ __| |/ / _ \\/ __| \n\
| |_| | (__|   < (_) \\__ \\ \n\
 \\__|_|\\___|_|\\_\\___/|___/ \n\
\n\
Scheduling and synchronization core of a teaching kernel\n"
    );
    for option in args.unknown.iter() {
        warning!("Unknown option: {option}");
    }
    println!("Command line: {}", std::env::args().skip(1).collect::<Vec<_>>().join(" "));
    let builder = SystemConfigurationBuilder {
        config: Config::from_args(&args),
    };
    config::set_cmdline(args);

    let exit_code = thread::run_to_exit(move || main(builder));
    if kernel::try_kernel().is_none() {
        power::power_off(exit_code);
    }
    thread::do_exit(exit_code);
    // The main thread is dead; its host thread must not touch the machine.
    loop {
        std::thread::park();
    }
}

// Test utilities
#[doc(hidden)]
pub trait TestCase
where
    Self: Sync + Send,
{
    fn name(&'static self) -> &'static str;
    fn run(&'static self) -> bool;
}

impl<T> TestCase for T
where
    T: Fn() + Send + Sync + 'static,
{
    fn name(&'static self) -> &'static str {
        core::any::type_name::<T>()
    }
    fn run(&'static self) -> bool {
        print!("test {} ... ", core::any::type_name::<T>());
        if thread::ThreadBuilder::new(core::any::type_name::<T>())
            .spawn(self)
            .join()
            == 0
        {
            println!("ok");
            true
        } else {
            println!("FAILED");
            false
        }
    }
}

/// A driver for running tests.
pub struct TestDriver {
    _p: (),
}

impl TestDriver {
    /// Run the given tests, one at a time, then power off the machine.
    ///
    /// The words of the command line that are not options select the tests
    /// to run by name, without the crate prefix.
    pub fn start<const TC: usize>(tests: [&'static dyn TestCase; TC]) {
        Self::start_with_opt_in(tests, []);
    }

    /// Like [`TestDriver::start`], with tests in `opt_in` that run only
    /// when the command line names them.
    ///
    /// Tests that bring the machine down, such as checks that a misuse is
    /// fatal, go there.
    pub fn start_with_opt_in<const TC: usize, const OC: usize>(
        tests: [&'static dyn TestCase; TC],
        opt_in: [&'static dyn TestCase; OC],
    ) {
        thread::ThreadBuilder::new("test_main").spawn(move || {
            let filters = &config::cmdline().filters;
            let selected = |test: &&&'static dyn TestCase| {
                let name = test.name();
                let r = name.split("::").next().map(|n| n.len() + 2).unwrap_or(0);
                filters.iter().any(|f| f == &name[r.min(name.len())..])
            };
            let tests = tests
                .iter()
                .filter(|test| filters.is_empty() || selected(test))
                .chain(opt_in.iter().filter(|test| selected(test)))
                .collect::<Vec<_>>();
            let (total, mut succ) = (tests.len(), 0);
            println!(
                "Running {} test{}",
                total,
                if total == 1 { "" } else { "s" }
            );

            for test in tests {
                if test.run() {
                    succ += 1;
                }
            }
            println!(
                "test result: {}. {} passed; {} failed",
                if total == succ { "ok" } else { "FAILED" },
                succ,
                total - succ
            );

            power::power_off(if total == succ { 0 } else { 1 });
        });
    }
}

#[cfg(test)]
mod tests {
    use super::KernelError;

    #[test]
    fn error_codes() {
        for e in [
            KernelError::IOError,
            KernelError::NoMemory,
            KernelError::Busy,
            KernelError::InvalidArgument,
        ] {
            assert_eq!(KernelError::try_from(e.into_usize() as isize), Ok(e));
        }
        assert!(KernelError::try_from(-1).is_err());
    }

    #[test]
    fn io_errors() {
        let e = std::io::Error::new(std::io::ErrorKind::InvalidInput, "bad");
        assert_eq!(KernelError::from(e), KernelError::InvalidArgument);
        let e = std::io::Error::other("spawn");
        assert_eq!(KernelError::from(e), KernelError::IOError);
    }
}
