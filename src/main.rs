#![no_std]
#![no_main]

mod peripherals;
mod system;

// Panic handler and debugging
use defmt::unwrap;

use defmt_rtt as _;
use panic_probe as _;

// Device
use cortex_m_rt::entry;
use embassy_executor::{Executor, InterruptExecutor};
use embassy_futures::select::{select3, Either3};
use embassy_nrf::{
    bind_interrupts,
    gpio::{AnyPin, Input, Level, Output, OutputDrive, Pin, Pull},
    interrupt::{self as irq, InterruptExt},
    pac::interrupt,
    peripherals::SPI2,
    saadc::{self, ChannelConfig, Resolution, Saadc},
    spim,
};
use embassy_sync::{blocking_mutex::raw::ThreadModeRawMutex, signal::Signal};
use embassy_time::{with_timeout, Duration, Ticker, Timer};
use static_cell::StaticCell;

bind_interrupts!(struct Irqs {
    SAADC => saadc::InterruptHandler;
    SPIM2_SPIS2_SPI2 => spim::InterruptHandler<SPI2>;
});

// Crate
use biosense::{display::Screen, mode::GLUCOSE_CHANNEL, sampler::OVERSAMPLE, ModeController, Sampler, Settings};
use peripherals::{button::Button, display::CharacterLcd, sensors::Sensors};
use system::{config::SystemConfig, time::now_ms};

/// One SAADC scan every 100µs, ~39 samples/s after oversampling
const CONVERSION_PERIOD: Duration = Duration::from_micros(100);
const INPUT_POLL_PERIOD: Duration = Duration::from_millis(10);
/// Longest wait for a spot glucose reading
const SPOT_READ_TIMEOUT: Duration = Duration::from_millis(500);
/// Alerts are checked at least this often while no samples arrive
const IDLE_POLL_PERIOD: Duration = Duration::from_millis(100);

static SAMPLER: Sampler = Sampler::new(OVERSAMPLE);

static EXECUTOR_HIGH: InterruptExecutor = InterruptExecutor::new();
static EXECUTOR_LOW: StaticCell<Executor> = StaticCell::new();

// Communication channels
static MODE_CHANGE: Signal<ThreadModeRawMutex, ()> = Signal::new();
static SPOT_READ: Signal<ThreadModeRawMutex, ()> = Signal::new();

type Controller = ModeController<'static, CharacterLcd<'static, SPI2>, Output<'static, AnyPin>>;

#[interrupt]
unsafe fn SWI0_EGU0() {
    EXECUTOR_HIGH.on_interrupt()
}

/// Runs on the interrupt executor and preempts the processing loop
#[embassy_executor::task]
async fn acquire(saadc: Saadc<'static, 2>) {
    let mut sensors = Sensors::init(saadc).await;
    let mut ticker = Ticker::every(CONVERSION_PERIOD);
    loop {
        let raw = sensors.convert().await;
        SAMPLER.on_conversion(sensors.mux(), raw, now_ms());

        ticker.next().await;
    }
}

/// Polls the mode button and the spot read selector every 10ms
#[embassy_executor::task]
async fn poll_inputs(mut mode_button: Button<'static>, mut spot_select: Button<'static>) {
    loop {
        if mode_button.pressed() {
            MODE_CHANGE.signal(());
        }
        if spot_select.pressed() {
            SPOT_READ.signal(());
        }

        Timer::after(INPUT_POLL_PERIOD).await;
    }
}

/// Hands batches and user input to the mode controller
#[embassy_executor::task]
async fn process(mut controller: Controller) {
    controller.start(now_ms());
    loop {
        match select3(SAMPLER.wait_batch(), MODE_CHANGE.wait(), Timer::after(IDLE_POLL_PERIOD)).await {
            Either3::First(batch) => controller.process_batch(&batch, now_ms()),
            Either3::Second(()) => {
                controller.request_next_mode(now_ms());
            }
            Either3::Third(()) => {}
        }

        if SPOT_READ.signaled() {
            SPOT_READ.reset();
            let sample = with_timeout(SPOT_READ_TIMEOUT, SAMPLER.read_once(GLUCOSE_CHANNEL))
                .await
                .ok();
            if sample.is_none() {
                defmt::warn!("spot reading timed out");
            }
            controller.show_spot_reading(sample);
        }

        controller.poll(now_ms());
    }
}

#[entry]
fn main() -> ! {
    let p = embassy_nrf::init(SystemConfig::new());
    defmt::info!("Initializing");

    // Initialize SAADC
    let mut saadc_config = saadc::Config::default();
    // 10 bit matches the units of the detection thresholds
    saadc_config.resolution = Resolution::_10BIT;
    // Pin P0.02/AIN0: photodiode, pin P0.03/AIN1: photoresistor
    let channels = [ChannelConfig::single_ended(p.P0_02), ChannelConfig::single_ended(p.P0_03)];
    let saadc = Saadc::new(p.SAADC, Irqs, saadc_config, channels);
    irq::SAADC.set_priority(SystemConfig::ACQUISITION_PRIORITY);

    // Initialize SPI
    let mut spim_config = spim::Config::default();
    // Use SPI at 8MHz (the fastest clock available on the nRF52832),
    // otherwise refreshing will be super slow.
    spim_config.frequency = spim::Frequency::M8;
    // SPI must be used in mode 3. Mode 0 (the default) won't work.
    spim_config.mode = spim::MODE_3;

    let spim = spim::Spim::new_txonly(p.SPI2, Irqs, p.P0_22, p.P0_23, spim_config);

    // Initialize LCD
    let lcd = unwrap!(CharacterLcd::init(
        spim,
        Output::new(p.P0_25.degrade(), Level::Low, OutputDrive::Standard),
        Output::new(p.P0_18.degrade(), Level::Low, OutputDrive::Standard),
        Output::new(p.P0_26.degrade(), Level::Low, OutputDrive::Standard),
    ));

    // Heartbeat indicator
    let led = Output::new(p.P0_17.degrade(), Level::Low, OutputDrive::Standard);

    // Initialize inputs, both active low
    let mode_button = Button::init(Input::new(p.P0_13.degrade(), Pull::Up));
    let spot_select = Button::init(Input::new(p.P0_11.degrade(), Pull::Up));

    let controller = ModeController::new(&SAMPLER, Screen::new(lcd), led, Settings::default());

    defmt::info!("Initialization finished");

    // Acquisition preempts everything else
    irq::SWI0_EGU0.set_priority(SystemConfig::ACQUISITION_PRIORITY);
    let spawner = EXECUTOR_HIGH.start(irq::SWI0_EGU0);
    unwrap!(spawner.spawn(acquire(saadc)));

    let executor = EXECUTOR_LOW.init(Executor::new());
    executor.run(|spawner| {
        unwrap!(spawner.spawn(poll_inputs(mode_button, spot_select)));
        unwrap!(spawner.spawn(process(controller)));
    })
}
