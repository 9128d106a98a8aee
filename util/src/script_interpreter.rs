//! # Feed script interpreter module
//!
//! This module provides an interpreter for feed scripts, which replay waypoint and range messages
//! at set times instead of receiving them from the network.
//!
//! Each entry of a script has the form `<time_s>: <FeedMsg JSON>;`, for example:
//!
//! ```text
//! 0.5: {"Range": {"dist": 120}};
//! 1.0: {"Waypoint": {"x": 2, "y": 2}};
//! ```

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::fs;
use regex::RegexBuilder;
use thiserror::Error;

// Internal
use comms_if::feed::FeedMsg;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// A message which is scripted to be released at a specific time.
struct ScriptedMsg {
    /// The session time the message is released at
    exec_time_s: f64,

    /// The message itself
    msg: FeedMsg
}

/// A script interpreter.
///
/// After initialising with the path to the script to run use `.get_pending` to
/// acquire the messages whose release time has passed.
pub struct ScriptInterpreter {
    script_path: Option<PathBuf>,
    msgs: VecDeque<ScriptedMsg>
}

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum ScriptError {
    #[error("Could not find the script at {0:?}")]
    ScriptNotFound(PathBuf),

    #[error("Could not load the script: {0}")]
    ScriptLoadError(std::io::Error),

    #[error("The script is empty (or is so bad it can't be read)")]
    ScriptEmpty,

    #[error(
        "Script contains an invalid timestamp: {0}. \
        Should be a float (like 1.0)")]
    InvalidTimestamp(String),

    #[error("Script contains an invalid message at {0} s: {1}")]
    InvalidMsg(f64, serde_json::Error)
}

/// Messages that are due for release.
#[derive(Debug, PartialEq)]
pub enum PendingMsgs {
    None,
    Some(Vec<FeedMsg>),
    EndOfScript
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl ScriptInterpreter {

    /// Create a new interpreter from the given script path.
    pub fn new<P: AsRef<Path>>(script_path: P) -> Result<Self, ScriptError> {
        let path = PathBuf::from(script_path.as_ref());
        
        if !path.exists() {
            return Err(ScriptError::ScriptNotFound(path));
        }

        let script = fs::read_to_string(&path)
            .map_err(ScriptError::ScriptLoadError)?;

        let mut interp = Self::from_str(&script)?;
        interp.script_path = Some(path);

        Ok(interp)
    }

    /// Create a new interpreter from the contents of a script.
    pub fn from_str(script: &str) -> Result<Self, ScriptError> {
        let mut msg_queue: VecDeque<ScriptedMsg> = VecDeque::new();

        // Go through the script executing __the magic regex__.
        let re = RegexBuilder::
            new(r"^\s*(\d+(\.\d+)?)\s*:\s*([^;]*);")
            .multi_line(true)
            .build()
            .expect("Script regex is invalid");

        for cap in re.captures_iter(script) {
            // Groups 1 and 3 always participate in a match
            let exec_time_s: f64 = cap[1].parse()
                .map_err(|e| ScriptError::InvalidTimestamp(format!("{}", e)))?;

            let msg = FeedMsg::from_json(&cap[3])
                .map_err(|e| ScriptError::InvalidMsg(exec_time_s, e))?;

            msg_queue.push_back(ScriptedMsg {
                exec_time_s,
                msg
            });
        }

        if msg_queue.is_empty() {
            return Err(ScriptError::ScriptEmpty)
        }

        Ok(ScriptInterpreter {
            script_path: None,
            msgs: msg_queue
        })
    }

    /// Return the messages whose release time is earlier than `current_time_s`.
    ///
    /// Messages are released in script order.
    pub fn get_pending(&mut self, current_time_s: f64) -> PendingMsgs {

        // If the queue is empty the script is over and we return the end of
        // script variant
        if self.msgs.is_empty() {
            return PendingMsgs::EndOfScript
        }

        let mut msg_vec: Vec<FeedMsg> = vec![];

        while let Some(m) = self.msgs.front() {
            if m.exec_time_s >= current_time_s {
                break;
            }
            if let Some(m) = self.msgs.pop_front() {
                msg_vec.push(m.msg);
            }
        }

        if msg_vec.is_empty() {
            PendingMsgs::None
        }
        else {
            PendingMsgs::Some(msg_vec)
        }
    }

    /// Get the number of messages remaining in the script
    pub fn get_num_msgs(&self) -> usize {
        self.msgs.len()
    }

    /// Get the length of the script in seconds
    pub fn get_duration(&self) -> f64 {
        match self.msgs.back() {
            Some(m) => m.exec_time_s,
            None => 0f64
        }
    }

    /// Get the path the script was loaded from, if it was loaded from a file.
    pub fn script_path(&self) -> Option<&Path> {
        self.script_path.as_deref()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    const SCRIPT: &str = r#"
        0.0: {"Range": {"dist": 120}};
        0.5: {"Waypoint": {"x": 2, "y": 2}};
        0.5: {"Waypoint": {"x": 95, "y": 95}};
        2.0: {"Range": {"dist": 10}};
    "#;

    #[test]
    fn test_pending_release() {
        let mut interp = ScriptInterpreter::from_str(SCRIPT).unwrap();
        assert_eq!(interp.get_num_msgs(), 4);
        assert_eq!(interp.get_duration(), 2.0);
        assert!(interp.script_path().is_none());

        assert_eq!(interp.get_pending(0.0), PendingMsgs::None);
        assert_eq!(
            interp.get_pending(0.1),
            PendingMsgs::Some(vec![FeedMsg::Range { dist: 120 }])
        );
        assert_eq!(
            interp.get_pending(1.0),
            PendingMsgs::Some(vec![
                FeedMsg::Waypoint { x: 2, y: 2 },
                FeedMsg::Waypoint { x: 95, y: 95 }
            ])
        );
        assert_eq!(interp.get_pending(1.5), PendingMsgs::None);
        assert_eq!(
            interp.get_pending(2.5),
            PendingMsgs::Some(vec![FeedMsg::Range { dist: 10 }])
        );
        assert_eq!(interp.get_pending(3.0), PendingMsgs::EndOfScript);
    }

    #[test]
    fn test_bad_scripts() {
        assert!(matches!(
            ScriptInterpreter::from_str("nothing here"),
            Err(ScriptError::ScriptEmpty)
        ));
        assert!(matches!(
            ScriptInterpreter::from_str(r#"1.0: {"Heading": 1};"#),
            Err(ScriptError::InvalidMsg(_, _))
        ));
        assert!(matches!(
            ScriptInterpreter::new("/does/not/exist.feed"),
            Err(ScriptError::ScriptNotFound(_))
        ));
    }
}
