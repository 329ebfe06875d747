//! Command dispatcher
//!
//! Two-level dispatch: message id first, then the function code of the
//! ground command. Every command has a fixed payload size, checked before
//! the handler runs. Any dispatch or handler error costs one error count.

use super::GatewayContext;
use crate::codec::Encoder;
use crate::constants::{CMD_MID, SEND_HK_MID};
use crate::error::{GatewayError, Result};
use crate::logging::EventId;
use crate::message::payload::{AddPacketCmd, EnableOutputCmd, RemovePacketCmd};
use crate::message::Message;
use crate::transport::Downlink;

/// Ground command function codes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum CommandCode {
    Noop = 0,
    ResetCounters = 1,
    AddPacket = 2,
    SendDataTypes = 3,
    RemovePacket = 4,
    RemoveAll = 5,
    EnableOutput = 6,
}

impl CommandCode {
    /// Exact payload size the command must carry
    pub fn payload_len(self) -> usize {
        match self {
            Self::Noop | Self::ResetCounters | Self::SendDataTypes | Self::RemoveAll => 0,
            Self::AddPacket => AddPacketCmd::LEN,
            Self::RemovePacket => RemovePacketCmd::LEN,
            Self::EnableOutput => EnableOutputCmd::LEN,
        }
    }
}

impl TryFrom<u8> for CommandCode {
    type Error = GatewayError;

    fn try_from(code: u8) -> Result<Self> {
        match code {
            0 => Ok(Self::Noop),
            1 => Ok(Self::ResetCounters),
            2 => Ok(Self::AddPacket),
            3 => Ok(Self::SendDataTypes),
            4 => Ok(Self::RemovePacket),
            5 => Ok(Self::RemoveAll),
            6 => Ok(Self::EnableOutput),
            _ => Err(GatewayError::UnknownFunctionCode { code }),
        }
    }
}

impl<E: Encoder, D: Downlink> GatewayContext<E, D> {
    /// Drain the command pipe to empty
    ///
    /// Returns the number of messages handled.
    pub fn process_commands(&mut self) -> usize {
        let mut handled = 0;
        while let Some(msg) = self.bus.poll(self.cmd_pipe) {
            self.dispatch(&msg);
            handled += 1;
        }
        handled
    }

    /// Route one message from the command pipe
    pub fn dispatch(&mut self, msg: &Message) {
        if let Err(e) = self.try_dispatch(msg) {
            let id = match e {
                GatewayError::UnknownFunctionCode { .. } => EventId::FnCodeErr,
                GatewayError::WrongLength { .. } | GatewayError::MalformedMessage { .. } => {
                    EventId::LengthErr
                }
                GatewayError::InvalidDestination { .. } => EventId::DestinationErr,
                _ => EventId::MsgIdErr,
            };
            self.counters.inc_error();
            self.events.error(id, e.to_string());
        }
    }

    fn try_dispatch(&mut self, msg: &Message) -> Result<()> {
        match msg.msg_id() {
            CMD_MID => self.dispatch_command(msg),
            SEND_HK_MID => {
                self.send_housekeeping();
                Ok(())
            }
            msg_id => Err(GatewayError::UnknownMessageId { msg_id }),
        }
    }

    fn dispatch_command(&mut self, msg: &Message) -> Result<()> {
        let code = msg
            .function_code()
            .ok_or(GatewayError::MalformedMessage { len: msg.len() })?;
        let command = CommandCode::try_from(code)?;

        let payload = msg.payload();
        let wrong_length = || GatewayError::WrongLength {
            msg_id: msg.msg_id(),
            code,
            expected: command.payload_len(),
            actual: payload.len(),
        };
        if payload.len() != command.payload_len() {
            return Err(wrong_length());
        }

        match command {
            CommandCode::Noop => self.noop(),
            CommandCode::ResetCounters => self.reset_counters(),
            CommandCode::AddPacket => {
                let cmd = AddPacketCmd::decode(payload).ok_or_else(wrong_length)?;
                self.add_packet(cmd)
            }
            CommandCode::SendDataTypes => self.send_data_types(),
            CommandCode::RemovePacket => {
                let cmd = RemovePacketCmd::decode(payload).ok_or_else(wrong_length)?;
                self.remove_packet(cmd)
            }
            CommandCode::RemoveAll => self.remove_all(),
            CommandCode::EnableOutput => {
                let cmd = EnableOutputCmd::decode(payload).ok_or_else(wrong_length)?;
                self.enable_output(cmd)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_code_round_trip() {
        for code in 0u8..=6 {
            assert_eq!(CommandCode::try_from(code).unwrap() as u8, code);
        }
        assert!(matches!(
            CommandCode::try_from(7),
            Err(GatewayError::UnknownFunctionCode { code: 7 })
        ));
    }

    #[test]
    fn test_payload_lengths() {
        assert_eq!(CommandCode::Noop.payload_len(), 0);
        assert_eq!(CommandCode::AddPacket.payload_len(), 6);
        assert_eq!(CommandCode::RemovePacket.payload_len(), 2);
        assert_eq!(CommandCode::EnableOutput.payload_len(), 16);
    }
}
