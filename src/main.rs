use clap::Parser;
use log::{error, info};
use serial_link::prelude::*;
use serial_link::serial::{DEFAULT_BAUD_RATE, DEFAULT_READ_BUFFER_SIZE};
use std::io::{self, BufRead};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

/// Console terminal for one serial port: stdin lines are sent, received
/// chunks are printed.
#[derive(Parser, Debug)]
#[command(name = "serial_link", version, about)]
struct Args {
    /// device node, e.g. /dev/ttyUSB0
    #[arg(short, long)]
    port: PathBuf,

    /// baud rate
    #[arg(short, long, default_value_t = DEFAULT_BAUD_RATE)]
    baud: u32,

    /// open flags passed through to the driver
    #[arg(long, default_value_t = 0)]
    flags: i32,

    /// how typed lines are encoded and received bytes are shown (hex, utf8, ascii, binary)
    #[arg(short, long, default_value_t = DataType::Utf8)]
    format: DataType,

    /// append "\r\n" to every typed line
    #[arg(long)]
    crlf: bool,

    /// read buffer size in bytes
    #[arg(long, default_value_t = DEFAULT_READ_BUFFER_SIZE)]
    buffer_size: usize,

    /// read timeout in milliseconds
    #[arg(long, default_value_t = 100)]
    read_timeout_ms: u64,

    /// do not try to chmod the device node through su
    #[arg(long)]
    no_elevate: bool,
}

fn timestamp() -> String {
    chrono::Local::now().format("%Y-%m-%d %H:%M:%S%.3f").to_string()
}

fn data_listener(format: DataType) -> Arc<dyn DataListener> {
    Arc::new(
        DataCallbacks::new()
            .with_received(move |bytes| {
                println!("[{}-RX] {}", timestamp(), decode_bytes(bytes, format));
            })
            .with_sent(move |bytes| {
                println!("[{}-TX] {}", timestamp(), decode_bytes(bytes, format));
            })
            .with_error(|e| {
                eprintln!("[{}-ERR] {e}", timestamp());
            }),
    )
}

fn run(args: Args) -> serial_link::error::Result<()> {
    let config = ManagerConfig::default()
        .with_read_buffer_size(args.buffer_size)
        .with_read_timeout(Duration::from_millis(args.read_timeout_ms));
    let device = NativeSerialDevice::new(config.read_timeout);
    let manager = if args.no_elevate {
        SerialPortManager::with_device(device, NoElevation, config)?
    } else {
        let su = SuPermissions::new(config.su_path.clone());
        SerialPortManager::with_device(device, su, config)?
    };

    manager
        .set_open_listener(Some(Arc::new(
            OpenCallbacks::new()
                .with_success(|d| info!("Connected to {d}"))
                .with_fail(|d, status| error!("Could not open {d}: {status}")),
        )))
        .set_data_listener(Some(data_listener(args.format)));

    manager.open(DeviceDescriptor::new(args.port.clone(), args.baud).with_flags(args.flags))?;

    for line in io::stdin().lock().lines() {
        let line = line?;
        let mut bytes = encode_string(&line, args.format);
        if args.crlf {
            bytes.extend_from_slice(b"\r\n");
        }
        if !manager.send(&bytes) {
            error!("Serial port is closed, dropping input");
            break;
        }
    }

    manager.close();
    Ok(())
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    match run(Args::parse()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e}");
            ExitCode::FAILURE
        }
    }
}
