//! Audio capture
//!
//! A [`CaptureSource`] yields fixed-length mono blocks. The capture task forwards
//! them to the analysis task over a bounded channel and simply ends when the
//! source fails; nothing downstream depends on it staying alive.

use crate::error::{Error, Result};
use async_trait::async_trait;
use std::process::Stdio;
use tokio::io::AsyncReadExt;
use tokio::process::{Child, ChildStdout, Command};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

/// One capture period of mono samples
pub type AudioBlock = Vec<f32>;

/// Producer of audio blocks
#[async_trait]
pub trait CaptureSource: Send {
    /// Next block, or `None` when the stream has ended cleanly
    async fn next_block(&mut self) -> Result<Option<AudioBlock>>;

    /// Human-readable description for logs
    fn describe(&self) -> String;
}

/// Pump blocks from `source` into `tx` until either side stops
///
/// Capture failure ends only this task.
pub async fn run_capture(mut source: Box<dyn CaptureSource>, tx: mpsc::Sender<AudioBlock>) {
    info!("Audio capture started: {}", source.describe());
    let mut blocks: u64 = 0;

    loop {
        match source.next_block().await {
            Ok(Some(block)) => {
                blocks += 1;
                if tx.send(block).await.is_err() {
                    debug!("Analysis task gone, stopping capture");
                    break;
                }
            }
            Ok(None) => {
                warn!(blocks, "Audio capture stream ended");
                break;
            }
            Err(e) => {
                error!(blocks, "Audio capture failed: {}", e);
                break;
            }
        }
    }
}

/// Capture from a child process writing raw `f32` little-endian mono PCM to stdout
///
/// Typically `parec` on the default monitor source.
pub struct PipeCapture {
    program: String,
    args: Vec<String>,
    block_size: usize,
    child: Option<Child>,
    stdout: Option<ChildStdout>,
    raw: Vec<u8>,
}

impl PipeCapture {
    /// `command[0]` is the program; `{rate}` in any argument becomes the sample rate
    pub fn new(command: &[String], sample_rate: u32, block_size: usize) -> Result<Self> {
        let (program, args) = command
            .split_first()
            .ok_or_else(|| Error::Capture("capture command is empty".to_string()))?;
        let rate = sample_rate.to_string();

        Ok(Self {
            program: program.clone(),
            args: args.iter().map(|a| a.replace("{rate}", &rate)).collect(),
            block_size,
            child: None,
            stdout: None,
            raw: vec![0u8; block_size * 4],
        })
    }

    pub fn args(&self) -> &[String] {
        &self.args
    }

    fn spawn(&mut self) -> Result<()> {
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| Error::Capture(format!("failed to start {}: {}", self.program, e)))?;

        self.stdout = child.stdout.take();
        self.child = Some(child);
        Ok(())
    }
}

#[async_trait]
impl CaptureSource for PipeCapture {
    async fn next_block(&mut self) -> Result<Option<AudioBlock>> {
        if self.child.is_none() {
            self.spawn()?;
        }
        let stdout = self
            .stdout
            .as_mut()
            .ok_or_else(|| Error::Capture("capture process has no stdout".to_string()))?;

        match stdout.read_exact(&mut self.raw).await {
            Ok(_) => Ok(Some(decode_f32le(&self.raw))),
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => Ok(None),
            Err(e) => Err(Error::Capture(format!("read from {} failed: {}", self.program, e))),
        }
    }

    fn describe(&self) -> String {
        format!("{} {} ({} samples/block)", self.program, self.args.join(" "), self.block_size)
    }
}

/// Raw little-endian `f32` bytes to samples; a trailing partial sample is dropped
pub fn decode_f32le(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(4)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect()
}

/// Average interleaved frames down to mono
pub fn downmix(interleaved: &[f32], channels: usize) -> Vec<f32> {
    if channels <= 1 {
        return interleaved.to_vec();
    }
    interleaved
        .chunks(channels)
        .map(|frame| frame.iter().sum::<f32>() / frame.len() as f32)
        .collect()
}

#[cfg(feature = "cpal")]
pub use device::CpalCapture;

#[cfg(feature = "cpal")]
mod device {
    use super::{downmix, AudioBlock, CaptureSource};
    use crate::error::{Error, Result};
    use async_trait::async_trait;
    use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;
    use tokio::sync::mpsc;
    use tracing::{info, warn};

    /// Capture from the default cpal input device
    ///
    /// The cpal stream lives on its own thread because streams are not `Send` on
    /// every host. The callback hands chunks over with `try_send`; chunks are
    /// dropped when the consumer falls behind.
    pub struct CpalCapture {
        rx: mpsc::Receiver<Vec<f32>>,
        pending: Vec<f32>,
        block_size: usize,
        device_name: String,
        stop: Arc<AtomicBool>,
    }

    impl CpalCapture {
        pub fn open(block_size: usize) -> Result<Self> {
            let (tx, rx) = mpsc::channel::<Vec<f32>>(64);
            let (ready_tx, ready_rx) = std::sync::mpsc::channel::<Result<String>>();
            let stop = Arc::new(AtomicBool::new(false));
            let thread_stop = Arc::clone(&stop);

            std::thread::Builder::new()
                .name("cpal-capture".to_string())
                .spawn(move || {
                    let stream = match build_stream(tx) {
                        Ok((stream, name)) => {
                            let _ = ready_tx.send(Ok(name));
                            stream
                        }
                        Err(e) => {
                            let _ = ready_tx.send(Err(e));
                            return;
                        }
                    };
                    while !thread_stop.load(Ordering::Relaxed) {
                        std::thread::park_timeout(std::time::Duration::from_millis(250));
                    }
                    drop(stream);
                })
                .map_err(|e| Error::Capture(format!("failed to start capture thread: {}", e)))?;

            let device_name = ready_rx
                .recv()
                .map_err(|_| Error::Capture("capture thread exited".to_string()))??;
            info!("Opened input device: {}", device_name);

            Ok(Self {
                rx,
                pending: Vec::with_capacity(block_size * 2),
                block_size,
                device_name,
                stop,
            })
        }
    }

    fn build_stream(tx: mpsc::Sender<Vec<f32>>) -> Result<(cpal::Stream, String)> {
        let host = cpal::default_host();
        let device = host
            .default_input_device()
            .ok_or_else(|| Error::Capture("no default input device".to_string()))?;
        let name = device.name().unwrap_or_else(|_| "default".to_string());
        let config = device
            .default_input_config()
            .map_err(|e| Error::Capture(format!("no input config: {}", e)))?;
        let channels = config.channels() as usize;

        let stream = device
            .build_input_stream(
                &config.into(),
                move |data: &[f32], _: &cpal::InputCallbackInfo| {
                    let _ = tx.try_send(downmix(data, channels));
                },
                |e| warn!("Input stream error: {}", e),
                None,
            )
            .map_err(|e| Error::Capture(format!("failed to build input stream: {}", e)))?;
        stream
            .play()
            .map_err(|e| Error::Capture(format!("failed to start input stream: {}", e)))?;
        Ok((stream, name))
    }

    #[async_trait]
    impl CaptureSource for CpalCapture {
        async fn next_block(&mut self) -> Result<Option<AudioBlock>> {
            while self.pending.len() < self.block_size {
                match self.rx.recv().await {
                    Some(chunk) => self.pending.extend_from_slice(&chunk),
                    None => return Ok(None),
                }
            }
            let rest = self.pending.split_off(self.block_size);
            Ok(Some(std::mem::replace(&mut self.pending, rest)))
        }

        fn describe(&self) -> String {
            format!("input device {} ({} samples/block)", self.device_name, self.block_size)
        }
    }

    impl Drop for CpalCapture {
        fn drop(&mut self) {
            self.stop.store(true, Ordering::Relaxed);
        }
    }
}
