//! Simulated encode engine
//!
//! Stands in for the command-submission layer: frames are submitted in
//! order, processed one at a time on a dedicated thread, and reported
//! complete after a fixed latency. Completion is what allows the pipeline to
//! release a frame's tracked buffer slot.

use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::{unbounded, Receiver, Sender};
use tracing::{debug, error, info, trace};

use super::error::{PipelineError, PipelineResult};

/// Commands accepted by the hardware thread
#[derive(Debug, Clone, Copy)]
pub enum HardwareCommand {
    /// Execute the commands for one frame
    Submit { frame_num: u32 },

    /// Stop after finishing already submitted frames
    Shutdown,
}

/// Completion status reported for one frame
#[derive(Debug, Clone, Copy)]
pub struct FrameCompletion {
    pub frame_num: u32,

    /// Time from submission to completion
    pub latency: Duration,
}

/// Single-engine hardware model running on its own thread
pub struct HardwareSimulator {
    thread_handle: Option<JoinHandle<()>>,
    command_tx: Sender<HardwareCommand>,
    completion_rx: Receiver<FrameCompletion>,
    latency: Duration,
}

impl HardwareSimulator {
    /// Start the hardware thread with a fixed per-frame latency
    pub fn new(latency: Duration) -> PipelineResult<Self> {
        let (command_tx, command_rx) = unbounded::<HardwareCommand>();
        let (completion_tx, completion_rx) = unbounded::<FrameCompletion>();

        let thread_handle = thread::Builder::new()
            .name("encode-hw".to_string())
            .spawn(move || run_engine(latency, command_rx, completion_tx))
            .map_err(|e| PipelineError::Thread(format!("Thread spawn failed: {}", e)))?;

        debug!("Hardware simulator started ({:?} per frame)", latency);

        Ok(Self {
            thread_handle: Some(thread_handle),
            command_tx,
            completion_rx,
            latency,
        })
    }

    /// Queue a frame for execution
    pub fn submit(&self, frame_num: u32) -> PipelineResult<()> {
        trace!("Submitting frame {}", frame_num);
        self.command_tx
            .send(HardwareCommand::Submit { frame_num })
            .map_err(|_| PipelineError::ChannelClosed)
    }

    /// Next completion, if one is already available
    pub fn try_recv_completion(&self) -> Option<FrameCompletion> {
        self.completion_rx.try_recv().ok()
    }

    /// Wait up to `timeout` for the next completion
    pub fn recv_completion_timeout(&self, timeout: Duration) -> Option<FrameCompletion> {
        self.completion_rx.recv_timeout(timeout).ok()
    }

    pub fn latency(&self) -> Duration {
        self.latency
    }

    /// Stop the hardware thread and wait for it to exit
    pub fn shutdown(&mut self) -> PipelineResult<()> {
        let Some(handle) = self.thread_handle.take() else {
            return Ok(());
        };

        // Thread also exits once every sender is gone
        let _ = self.command_tx.send(HardwareCommand::Shutdown);

        if handle.join().is_err() {
            error!("Hardware thread panicked during shutdown");
            return Err(PipelineError::Thread("Thread panicked".to_string()));
        }

        info!("Hardware simulator stopped");
        Ok(())
    }
}

impl Drop for HardwareSimulator {
    fn drop(&mut self) {
        let _ = self.shutdown();
    }
}

impl std::fmt::Debug for HardwareSimulator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HardwareSimulator")
            .field("latency", &self.latency)
            .field("running", &self.thread_handle.is_some())
            .finish()
    }
}

fn run_engine(
    latency: Duration,
    command_rx: Receiver<HardwareCommand>,
    completion_tx: Sender<FrameCompletion>,
) {
    for command in command_rx.iter() {
        match command {
            HardwareCommand::Submit { frame_num } => {
                let started = Instant::now();
                if !latency.is_zero() {
                    thread::sleep(latency);
                }
                let completion = FrameCompletion {
                    frame_num,
                    latency: started.elapsed(),
                };
                if completion_tx.send(completion).is_err() {
                    debug!("Completion receiver gone, stopping engine");
                    break;
                }
            }
            HardwareCommand::Shutdown => break,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_completions_arrive_in_submission_order() {
        let hw = HardwareSimulator::new(Duration::ZERO).unwrap();
        for frame in 0..4 {
            hw.submit(frame).unwrap();
        }

        let done: Vec<u32> = (0..4)
            .map(|_| {
                hw.recv_completion_timeout(Duration::from_secs(1))
                    .unwrap()
                    .frame_num
            })
            .collect();
        assert_eq!(done, vec![0, 1, 2, 3]);
        assert!(hw.try_recv_completion().is_none());
    }

    #[test]
    fn test_latency_applied() {
        let hw = HardwareSimulator::new(Duration::from_millis(5)).unwrap();
        hw.submit(7).unwrap();
        let completion = hw.recv_completion_timeout(Duration::from_secs(1)).unwrap();
        assert_eq!(completion.frame_num, 7);
        assert!(completion.latency >= Duration::from_millis(5));
    }

    #[test]
    fn test_shutdown_is_idempotent() {
        let mut hw = HardwareSimulator::new(Duration::ZERO).unwrap();
        hw.shutdown().unwrap();
        hw.shutdown().unwrap();
        assert!(hw.submit(0).is_err());
    }
}
