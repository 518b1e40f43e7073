use clap::Parser;
use midibusrs::{
    cli::{handle_port_list, Args},
    logging,
    midi::{midir_port, MidirPort, MidirScanner, PortDirection, PortOptions, CLOCKS_PER_QUARTER},
    MasterBus, PortSettings, PortWatcher,
};
use std::thread;
use std::time::{Duration, Instant};

fn main() {
    let args = Args::parse();
    let mut settings = load_settings(&args);
    settings.manual_ports |= args.manual_ports;
    initialize_logging(&settings);

    if args.port_list {
        list_available_ports(&handle_port_list());
        return;
    }

    let options = settings.port_options();
    let master = MasterBus::new(settings);
    register_ports(&master, &options);
    if !master.initialize() {
        log::warn!("Some MIDI ports are unavailable; continuing with the rest");
    }
    print_buses(&master);

    if let Some(bars) = args.clock_test {
        run_clock_test(&master, args.bpm, bars);
    }

    if args.watch {
        if master.settings().manual_ports {
            log::warn!("--watch follows hardware ports; ignored with manual ports");
            eprintln!("--watch is ignored with --manual-ports");
        } else {
            run_port_watcher(&master, &options);
        }
    }
}

fn load_settings(args: &Args) -> PortSettings {
    match PortSettings::load(args.config.as_deref()) {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("Error loading port settings: {}", e);
            std::process::exit(1);
        }
    }
}

fn initialize_logging(settings: &PortSettings) {
    if let Err(e) = logging::init_logger(settings) {
        eprintln!("Logger initialization failed: {}", e);
    }
    log::info!("Application starting");
}

fn list_available_ports(ports: &[String]) {
    println!("Available MIDI ports:");
    for port in ports {
        println!("  - {}", port);
    }
}

fn register_ports(master: &MasterBus, options: &PortOptions) {
    let mut handles: Vec<MidirPort> = Vec::new();

    if master.settings().manual_ports {
        log::info!(
            "Creating {} virtual output ports and one virtual input",
            master.settings().manual_port_count
        );
        for index in 0..master.settings().manual_port_count {
            handles.push(MidirPort::virtual_port(options, PortDirection::Output, index));
        }
        handles.push(MidirPort::virtual_port(options, PortDirection::Input, 0));
    } else {
        let discovered = midir_port::discover_outputs(options).and_then(|mut outputs| {
            outputs.extend(midir_port::discover_inputs(options)?);
            Ok(outputs)
        });
        match discovered {
            Ok(ports) => handles = ports,
            Err(e) => {
                log::error!("Error discovering MIDI ports: {}", e);
                eprintln!("Error discovering MIDI ports: {}", e);
                std::process::exit(1);
            }
        }
    }

    for handle in handles {
        if let Err(e) = master.add_port(Box::new(handle)) {
            log::error!("Could not register port: {}", e);
        }
    }
}

fn print_buses(master: &MasterBus) {
    println!("Output buses:");
    for bus in 0..master.outputs().len() {
        println!(
            "  {} (clock {})",
            master.outputs().get_midi_bus_name(bus),
            master.outputs().get_clock(bus)
        );
    }
    println!("Input buses:");
    for bus in 0..master.inputs().len() {
        let state = if master.inputs().get_input(bus) { "on" } else { "off" };
        println!("  {} (input {})", master.inputs().get_midi_bus_name(bus), state);
    }
}

fn run_clock_test(master: &MasterBus, bpm: u32, bars: u32) {
    let ppqn = i64::from(master.settings().ppqn);
    let step = (ppqn / CLOCKS_PER_QUARTER).max(1);
    let end_tick = ppqn * 4 * i64::from(bars);
    let step_interval =
        Duration::from_secs_f64(60.0 / f64::from(bpm.max(1)) / CLOCKS_PER_QUARTER as f64);

    log::info!("Clock test: {} bars at {} BPM", bars, bpm);
    println!("Sending clock for {} bars at {} BPM...", bars, bpm);

    master.init_clock(0);
    let mut tick = 0;
    while tick <= end_tick {
        let step_start = Instant::now();
        master.clock(tick);
        tick += step;

        let elapsed = step_start.elapsed();
        if elapsed < step_interval {
            thread::sleep(step_interval - elapsed);
        }
    }
    master.stop();
    log::info!("Clock test finished at tick {}", tick);
}

fn run_port_watcher(master: &MasterBus, options: &PortOptions) {
    let mut watcher = PortWatcher::new(master.settings().watch_interval());
    let events = watcher.start(MidirScanner::new(options.clone()));

    log::info!("Watching for MIDI port changes");
    println!("\nWatching for MIDI port changes. Press Ctrl+C to exit...");
    for event in events.iter() {
        log::info!("Port event: {:?}", event);
        master.handle_event(event, |identity| midir_port::open_port(options, identity));
        print_buses(master);
    }
    watcher.stop();
}
