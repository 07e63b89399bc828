//! FireSide lifecycle
//!
//! # Design
//!
//! The controller is a polled state machine. Each [`FireSide::poll`] evaluates the guard of the
//! current state once, runs the actions of at most one transition and returns. Nothing in the
//! loop busy-waits except the retry delay in the failure state, so the storage writer keeps pace
//! with acquisition while logging.
//!
//! | From    | Event                             | To      |
//! |---------|-----------------------------------|---------|
//! | BOOT    | `SAFE`                            | SAFE    |
//! | BOOT    | any other command                 | CONVERT |
//! | SAFE    | `ARM`                             | ARM     |
//! | ARM     | `LAUNCH`, storage self-test passes| LAUNCH  |
//! | ARM     | `SAFE`, storage self-test passes  | SAFE    |
//! | ARM     | anything else, or self-test fails | FAILURE |
//! | LAUNCH  | immediately                       | LOGGING |
//! | LOGGING | stop honoured and final block on storage | CONVERT |
//! | LOGGING | acquisition or storage fault      | FAILURE |
//! | CONVERT | conversion complete               | SAFE    |
//! | CONVERT | conversion failed                 | FAILURE |
//! | FAILURE | `SAFE`                            | SAFE    |
//!
//! The igniters are driven safe on entry to every state other than LAUNCH and LOGGING.
//!
//! # Errors
//!
//! Runtime faults route to FAILURE, which repeats diagnostics until an operator sends `SAFE`.
//! Configuration faults (the storage medium missing at boot, the converter rejecting its setup,
//! outputs that cannot be driven safe) are returned from [`FireSide::poll`] after being
//! announced on the link. [`FireSide::run`] then blinks the error code forever.
use core::fmt::Write as _;
use embedded_hal::delay::DelayNs;
use embedded_hal::digital::OutputPin;
use embedded_io::Error as _;

use crate::acquisition::{Converter, TransferController};
use crate::channels::ChannelConfig;
use crate::design_parameters::TABLE_EXTENSION;
use crate::error::{self, Error};
use crate::link::{self, Command, Link, Text};
use crate::log_converter::{LogConverter, Report};
use crate::outputs::{Igniters, StatusIndicator};
use crate::settings::Settings;
use crate::storage::{self, Clock, FileName, LogFile, Storage, StorageWriter};
use crate::telemetry::ChannelReadout;

#[derive(
    Copy,
    Clone,
    Debug,
    PartialEq,
    Eq,
    strum::Display,
    strum::IntoStaticStr,
)]
#[strum(serialize_all = "UPPERCASE")]
pub enum State {
    Boot,
    Safe,
    Arm,
    Launch,
    Logging,
    Convert,
    Failure,
}

/// The board-specific types FireSide runs on.
pub trait Platform {
    type Storage: Storage;
    type Link: Link;
    type Igniters: Igniters;
    type Indicator: OutputPin;
    type Clock: Clock;
    type Delay: DelayNs;
}

/// Board peripherals owned by the state machine.
pub struct Board<P: Platform> {
    pub storage: P::Storage,
    pub link: P::Link,
    pub igniters: P::Igniters,
    pub indicator: StatusIndicator<P::Indicator>,
    pub clock: P::Clock,
    pub delay: P::Delay,
}

type File<P> = <<P as Platform>::Storage as Storage>::File;

struct Session<F> {
    name: FileName,
    writer: StorageWriter<F>,
}

/// Transition selected by a guard, if any.
type Step = Result<Option<State>, Error>;

pub struct FireSide<
    'a,
    P: Platform,
    C,
    const CHANNELS: usize,
    const ROWS: usize,
> {
    board: Board<P>,
    controller: TransferController<'a, C, CHANNELS, ROWS>,
    config: ChannelConfig<CHANNELS>,
    settings: Settings,
    state: State,
    session: Option<Session<File<P>>>,
    log: Option<FileName>,
    diagnostics_due: bool,
}

impl<'a, P, C, const CHANNELS: usize, const ROWS: usize>
    FireSide<'a, P, C, CHANNELS, ROWS>
where
    P: Platform,
    C: Converter<CHANNELS>,
{
    /// # Args
    /// * `board` - Peripherals.
    /// * `controller` - Main-loop handle on the acquisition engine. The interrupt handler holds
    ///   its own copy.
    /// * `config` - Channel scan configuration. The row rate is taken from the settings.
    pub fn new(
        board: Board<P>,
        controller: TransferController<'a, C, CHANNELS, ROWS>,
        config: ChannelConfig<CHANNELS>,
    ) -> Self {
        Self {
            board,
            controller,
            config,
            settings: Settings::default(),
            state: State::Boot,
            session: None,
            log: None,
            diagnostics_due: false,
        }
    }

    pub fn state(&self) -> State {
        self.state
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn board(&self) -> &Board<P> {
        &self.board
    }

    pub fn board_mut(&mut self) -> &mut Board<P> {
        &mut self.board
    }

    /// Evaluate the current state once.
    ///
    /// # Returns
    /// The state after this step, or the unrecoverable error that halted the controller.
    pub fn poll(&mut self) -> Result<State, Error> {
        let step = match self.state {
            State::Boot => self.boot(),
            State::Safe => self.safe(),
            State::Arm => self.arm(),
            State::Launch => self.launch(),
            State::Logging => self.logging(),
            State::Convert => self.convert(),
            State::Failure => self.failure(),
        };

        match step {
            Ok(Some(next)) => self.enter(next).map_err(|e| self.fatal(e))?,
            Ok(None) => {}
            Err(e) => return Err(self.fatal(e)),
        }
        Ok(self.state)
    }

    /// Poll forever. An unrecoverable error blinks its code on the status indicator until
    /// power is removed.
    pub fn run(mut self) -> ! {
        loop {
            if let Err(error) = self.poll() {
                let period = self.settings.blink_period_ms;
                let Board {
                    indicator, delay, ..
                } = &mut self.board;
                indicator.off();
                indicator.blink_forever(error.code(), period, delay);
            }
        }
    }

    fn enter(&mut self, next: State) -> Result<(), Error> {
        log::info!("{} -> {}", self.state, next);
        self.state = next;
        if next == State::Failure {
            self.diagnostics_due = true;
        }
        if matches!(next, State::Launch | State::Logging) {
            return Ok(());
        }
        self.board.igniters.safe().map_err(|e| {
            log::error!("Igniters not safe: {e:?}");
            Error::Output
        })?;
        if self.board.igniters.is_firing() {
            log::error!("Igniters still enabled entering {next}");
            return Err(Error::Output);
        }
        Ok(())
    }

    /// Bring everything to rest and announce an unrecoverable error.
    fn fatal(&mut self, error: Error) -> Error {
        log::error!("Fatal: {error}");
        self.controller.halt();
        self.close_session();
        self.board.igniters.safe().ok();
        self.report(format_args!("FIRESIDE HALTED: {error}"));
        self.report(format_args!("Error Code: {}", u8::from(error.code())));
        error
    }

    fn say(&mut self, text: &str) {
        link::say(&mut self.board.link, text);
    }

    fn report(&mut self, args: core::fmt::Arguments<'_>) {
        let mut line = Text::new();
        if line.write_fmt(args).is_err() {
            log::warn!("Telemetry line truncated");
        }
        self.say(&line);
    }

    fn command(&mut self) -> Option<Command> {
        match self.board.link.poll_line() {
            Ok(Some(line)) => {
                let command = Command::parse(&line);
                log::info!("< {} ({command:?})", line.as_str());
                Some(command)
            }
            Ok(None) => None,
            Err(e) => {
                log::warn!("Link receive: {e:?}");
                None
            }
        }
    }

    fn boot(&mut self) -> Step {
        let Some(command) = self.command() else {
            return Ok(None);
        };

        let next = if command == Command::Safe {
            self.say("BOOTING FIRESIDE");
            State::Safe
        } else {
            self.say("BOOT OVERRIDE");
            State::Convert
        };

        self.board.indicator.on();
        self.board
            .storage
            .init()
            .map_err(|e| Error::StorageInit(e.kind()))?;
        self.settings = Settings::load(&mut self.board.storage);

        if next == State::Convert {
            self.log = storage::latest_log_name(&mut self.board.storage)
                .unwrap_or_else(|e| {
                    log::warn!("Log probe failed: {e}");
                    None
                });
            self.say("OVERRIDE SUCCESSFUL");
        } else {
            self.say("BOOT COMPLETE");
            self.say("FIRESIDE SAFE");
        }
        Ok(Some(next))
    }

    fn safe(&mut self) -> Step {
        match self.command() {
            Some(Command::Arm) => {
                self.say("ARMING FIRESIDE");
                self.readout()?;
                self.say("FIRESIDE ARMED");
                Ok(Some(State::Arm))
            }
            Some(command) => {
                log::info!("Ignoring {command:?} while safe");
                self.say("FIRESIDE SAFE");
                Ok(None)
            }
            None => Ok(None),
        }
    }

    fn arm(&mut self) -> Step {
        let Some(command) = self.command() else {
            return Ok(None);
        };

        self.say("TESTING SDCARD");
        if let Err(e) = storage::self_test(&mut self.board.storage) {
            self.report(format_args!("SDCARD FAILURE: {e}"));
            self.arming_failure();
            return Ok(Some(State::Failure));
        }

        match command {
            Command::Launch => self.launch_command(),
            Command::Safe => {
                self.say("DISARMING FIRESIDE");
                Ok(Some(State::Safe))
            }
            other => {
                self.report(format_args!("UNEXPECTED COMMAND: {other:?}"));
                self.arming_failure();
                Ok(Some(State::Failure))
            }
        }
    }

    fn arming_failure(&mut self) {
        self.say("ARMING FAILURE");
        self.say("ENSURING NO CURRENT TO IGNITERS");
    }

    fn launch_command(&mut self) -> Step {
        self.say("FIRESIDE LAUNCH COMMAND");
        let config = self.config.with_sample_rate(self.settings.sample_rate());
        self.controller.prepare(&config)?;
        self.say("ADC GO");
        self.say("DMA GO");

        match self.open_log() {
            Ok(session) => {
                self.report(format_args!("LOG FILE: {}", session.name));
                self.session = Some(session);
                self.say("BINARY LOGGER GO");
                Ok(Some(State::Launch))
            }
            Err(e) => {
                self.report(format_args!("LOG FILE FAILURE: {e}"));
                Ok(Some(State::Failure))
            }
        }
    }

    fn open_log(&mut self) -> Result<Session<File<P>>, Error> {
        let name = storage::next_log_name(&mut self.board.storage)?;
        let file = self
            .board
            .storage
            .create(&name)
            .map_err(error::storage)?;
        Ok(Session {
            name,
            writer: StorageWriter::new(file),
        })
    }

    fn close_session(&mut self) {
        if let Some(mut session) = self.session.take() {
            if let Err(e) = session.writer.close() {
                log::error!("Closing {}: {e}", session.name);
            }
        }
    }

    fn launch(&mut self) -> Step {
        self.say("RADIO SILENCE FIRESIDE");
        self.say("SEND ANY COMMAND TO STOP LOGGING");
        self.say("FIRING IGNITERS");
        if let Err(e) = self.board.link.discard_input() {
            log::warn!("Link flush: {e:?}");
        }

        self.controller.start()?;
        if let Err(e) = self.board.igniters.fire() {
            log::error!("Igniters failed to fire: {e:?}");
            self.controller.halt();
            self.close_session();
            self.say("IGNITER FAILURE");
            return Ok(Some(State::Failure));
        }
        self.board.indicator.off();
        Ok(Some(State::Logging))
    }

    fn logging(&mut self) -> Step {
        let acquisition = self.controller.acquisition();
        if !acquisition.stop_requested() {
            let stop = self.board.link.available().unwrap_or_else(|e| {
                log::warn!("Link receive: {e:?}");
                false
            });
            if stop {
                log::info!("Stop requested");
                acquisition.request_stop();
                self.board.link.discard_input().ok();
            }
        }

        let Some(session) = self.session.as_mut() else {
            self.controller.halt();
            self.say("NO ACTIVE LOG");
            return Ok(Some(State::Failure));
        };

        if let Err(e) = session.writer.pump(acquisition, &self.board.clock) {
            self.controller.halt();
            self.close_session();
            self.report(format_args!("LOGGING FAULT: {e}"));
            return Ok(Some(State::Failure));
        }

        if !(acquisition.finished() && acquisition.drained()) {
            return Ok(None);
        }

        let Some(mut session) = self.session.take() else {
            return Ok(None);
        };
        let records = session.writer.records();
        if let Err(e) = session.writer.close() {
            self.report(format_args!("LOG CLOSE FAILURE: {e}"));
            return Ok(Some(State::Failure));
        }
        self.say("LOGGING STOPPED");
        self.report(format_args!("{records} BLOCKS IN {}", session.name));
        self.log = Some(session.name);
        self.say("CONVERTING BINARY LOG");
        Ok(Some(State::Convert))
    }

    fn convert(&mut self) -> Step {
        self.board.indicator.on();
        let name = match self.log.take() {
            Some(name) => Some(name),
            None => storage::latest_log_name(&mut self.board.storage)
                .unwrap_or_else(|e| {
                    log::warn!("Log probe failed: {e}");
                    None
                }),
        };
        let Some(name) = name else {
            self.say("NO BINARY LOG FOUND");
            return Ok(Some(State::Failure));
        };

        self.report(format_args!("BINARY FILENAME: {name}"));
        match self.convert_log(&name) {
            Ok(report) => {
                log::info!("Converted {report:?}");
                self.report(format_args!("{} ROWS WRITTEN", report.rows));
                self.say("BINARY CONVERSION COMPLETE");
                self.board.indicator.off();
                self.say("SAFING FIRESIDE");
                Ok(Some(State::Safe))
            }
            Err(e) => {
                self.report(format_args!("CONVERSION FAILURE: {e}"));
                Ok(Some(State::Failure))
            }
        }
    }

    fn convert_log(&mut self, name: &str) -> Result<Report, Error> {
        let table = storage::with_extension(name, TABLE_EXTENSION)?;
        let converter = LogConverter::<CHANNELS, ROWS>::new(
            self.config.labels(),
            self.settings.progress_interval as u64,
        );

        let Board { storage, link, .. } = &mut self.board;
        let mut input = storage.open(name).map_err(error::storage)?;
        let size = input.size().map_err(error::storage)?;
        let mut line = Text::new();
        write!(line, "FILESIZE: {size} BYTES")?;
        link::say(link, &line);

        let mut output = storage.create(&table).map_err(error::storage)?;
        let result = converter.convert(&mut input, &mut output, |progress| {
            let mut line = Text::new();
            write!(
                line,
                "PROGRESS: {} / {} BYTES",
                progress.position, progress.size
            )
            .ok();
            link::say(link, &line);
        });

        let closed_output = output.close().map_err(error::storage);
        let closed_input = input.close().map_err(error::storage);
        let report = result?;
        closed_output?;
        closed_input?;
        Ok(report)
    }

    fn failure(&mut self) -> Step {
        if self.diagnostics_due {
            self.diagnostics_due = !self.diagnostics();
            if self.diagnostics_due {
                self.board.delay.delay_ms(self.settings.failure_retry_ms);
            }
        }

        match self.command() {
            Some(Command::Safe) => {
                self.say("SAFE COMMAND RECEIVED");
                self.say("RESETTING TO SAFE");
                Ok(Some(State::Safe))
            }
            Some(command) => {
                log::info!("Ignoring {command:?} in failure");
                self.say("SEND SAFE TO RECOVER");
                self.board.delay.delay_ms(self.settings.failure_retry_ms);
                self.diagnostics_due = true;
                Ok(None)
            }
            None => Ok(None),
        }
    }

    /// Report the health of every subsystem.
    ///
    /// # Returns
    /// True if all checks passed.
    fn diagnostics(&mut self) -> bool {
        self.say("FIRESIDE FAILURE");
        self.say("TURNING OFF IGNITERS");
        if let Err(e) = self.board.igniters.safe() {
            self.report(format_args!("IGNITER FAULT: {e:?}"));
            return false;
        }
        self.board.indicator.on();
        self.say("IGNITERS OFF");

        self.say("CHECKING SDCARD");
        if let Err(e) = self.board.storage.init() {
            self.report(format_args!("SDCARD INIT FAILURE: {:?}", e.kind()));
            return false;
        }
        self.say("TESTING SDCARD");
        if let Err(e) = storage::self_test(&mut self.board.storage) {
            self.report(format_args!("SDCARD FAILURE: {e}"));
            return false;
        }

        if let Err(e) = self.readout() {
            self.report(format_args!("ADC FAILURE: {e}"));
            return false;
        }
        self.say("DIAGNOSTICS PASSED");
        true
    }

    fn readout(&mut self) -> Result<(), Error> {
        let samples = self.controller.sample_once(&self.config)?;
        let line: Text = ChannelReadout::new(samples).render(&self.config)?;
        self.say("ADC CHANNEL STATUS");
        self.say(&line);
        Ok(())
    }
}
