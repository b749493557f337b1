//! Buffered channel reads
//!
//! russh hands out channel messages one at a time. [`ChannelReader`] keeps
//! what arrived so far and answers the questions a blocking caller asks:
//! is anything ready, give me up to N bytes, what was the exit status.

use bytes::{Bytes, BytesMut};

use super::transport::{ChannelEvent, SessionChannel};

/// Exit code reported when the channel ended without an exit status, or the
/// process died from a signal
pub const EXIT_STATUS_UNKNOWN: i32 = -1;

pub struct ChannelReader<C> {
    channel: C,
    stdout: BytesMut,
    stderr: BytesMut,
    combine_stderr: bool,
    exit_status: Option<i32>,
    eof: bool,
    closed: bool,
}

impl<C: SessionChannel> ChannelReader<C> {
    pub fn new(channel: C) -> Self {
        Self {
            channel,
            stdout: BytesMut::new(),
            stderr: BytesMut::new(),
            combine_stderr: false,
            exit_status: None,
            eof: false,
            closed: false,
        }
    }

    /// Route stderr into the stdout buffer from now on
    pub fn combine_stderr(mut self, combine: bool) -> Self {
        self.combine_stderr = combine;
        self
    }

    pub fn channel_mut(&mut self) -> &mut C {
        &mut self.channel
    }

    /// True once no more data will arrive
    pub fn is_finished(&self) -> bool {
        self.eof || self.closed
    }

    fn absorb(&mut self, event: ChannelEvent) {
        match event {
            ChannelEvent::Stdout(data) => self.stdout.extend_from_slice(&data),
            ChannelEvent::Stderr(data) if self.combine_stderr => {
                self.stdout.extend_from_slice(&data)
            }
            ChannelEvent::Stderr(data) => self.stderr.extend_from_slice(&data),
            ChannelEvent::ExitStatus(code) => self.exit_status = Some(code as i32),
            ChannelEvent::ExitSignal(signal) => {
                tracing::debug!("Remote process terminated by signal {}", signal);
                self.exit_status = Some(EXIT_STATUS_UNKNOWN);
            }
            ChannelEvent::Eof => self.eof = true,
            ChannelEvent::Closed => {
                self.eof = true;
                self.closed = true;
            }
        }
    }

    /// Wait for one event and buffer it. Returns false once the channel is
    /// closed.
    async fn pump(&mut self) -> bool {
        if self.closed {
            return false;
        }
        let event = self.channel.recv().await;
        self.absorb(event);
        true
    }

    /// Buffer everything that is already queued without waiting
    fn pump_ready(&mut self) {
        while !self.closed {
            match self.channel.try_recv() {
                Some(event) => self.absorb(event),
                None => break,
            }
        }
    }

    /// Block until the remote process reports its exit status
    pub async fn recv_exit_status(&mut self) -> i32 {
        while self.exit_status.is_none() {
            if !self.pump().await {
                break;
            }
        }
        self.exit_status.unwrap_or(EXIT_STATUS_UNKNOWN)
    }

    /// Whether stdout data can be read without waiting
    pub fn recv_ready(&mut self) -> bool {
        self.pump_ready();
        !self.stdout.is_empty()
    }

    /// Take up to `max` bytes of buffered stdout
    pub fn recv(&mut self, max: usize) -> Bytes {
        let n = max.min(self.stdout.len());
        self.stdout.split_to(n).freeze()
    }

    /// Drain stdout in chunks of at most `chunk` bytes for as long as data
    /// is immediately available
    pub fn drain_ready(&mut self, chunk: usize) -> Vec<u8> {
        let mut out = Vec::new();
        while self.recv_ready() {
            out.extend_from_slice(&self.recv(chunk));
        }
        out
    }

    /// Read until the remote side signals end of data, then hand back both
    /// streams
    pub async fn read_to_end(&mut self) -> (Bytes, Bytes) {
        while !self.is_finished() {
            if !self.pump().await {
                break;
            }
        }
        // exit-status may trail EOF; take whatever is already queued
        self.pump_ready();
        let stdout = self.stdout.split().freeze();
        let stderr = self.stderr.split().freeze();
        (stdout, stderr)
    }

    /// Exit status if it has been seen already
    pub fn exit_status(&self) -> Option<i32> {
        self.exit_status
    }

    /// Keep reading until the channel closes, collecting at most `limit`
    /// bytes of stdout
    pub async fn read_until_closed(&mut self, limit: usize) -> Bytes {
        while !self.closed && self.stdout.len() < limit {
            if !self.pump().await {
                break;
            }
        }
        self.recv(limit)
    }

    /// Close the underlying channel, ignoring errors
    pub async fn close(&mut self) {
        if self.closed {
            return;
        }
        if let Err(e) = self.channel.close().await {
            tracing::debug!("Ignoring channel close error: {}", e);
        }
        self.closed = true;
    }
}
