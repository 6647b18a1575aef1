//! Terminal WebSocket framing.
//!
//! Text frames carry these JSON shapes; binary frames are raw bytes in the
//! `input`/`output` direction. Close code 1000 for clean shutdown, 1011 for
//! server error.

use serde::{Deserialize, Serialize};

/// Frames from the client to the broker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientFrame {
    /// Keyboard input bytes (UTF-8).
    Input {
        /// Input data.
        data: String,
    },
    /// Terminal resize.
    Resize {
        /// Rows.
        rows: u16,
        /// Columns.
        cols: u16,
    },
    /// Signal request (e.g. `SIGINT`); delivered as the matching control byte.
    Signal {
        /// Signal name.
        data: String,
    },
}

/// Frames from the broker to the client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerFrame {
    /// Shell output bytes (UTF-8 lossy).
    Output {
        /// Output data.
        data: String,
    },
    /// Error report; the channel stays open unless followed by `Closed`.
    Error {
        /// Error reason.
        message: String,
    },
    /// Channel closed.
    Closed {
        /// Close reason (e.g. `server shutdown`, `idle timeout`).
        message: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_frames_round_trip() {
        let input: ClientFrame =
            serde_json::from_str(r#"{"type":"input","data":"ls\n"}"#).expect("input frame");
        assert_eq!(
            input,
            ClientFrame::Input {
                data: "ls\n".to_string()
            }
        );

        let resize: ClientFrame =
            serde_json::from_str(r#"{"type":"resize","rows":40,"cols":120}"#).expect("resize");
        assert_eq!(
            resize,
            ClientFrame::Resize {
                rows: 40,
                cols: 120
            }
        );
    }

    #[test]
    fn server_frames_serialize_with_type_tags() {
        let frame = ServerFrame::Closed {
            message: "idle timeout".to_string(),
        };
        let raw = serde_json::to_string(&frame).expect("serialize");
        assert_eq!(raw, r#"{"type":"closed","message":"idle timeout"}"#);
    }
}
