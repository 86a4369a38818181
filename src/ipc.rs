use crate::gate::GateStats;
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::net::Shutdown;
use std::os::unix::net::UnixStream;
use std::path::PathBuf;
use std::{env, io};

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub enum ControlMessage {
    SubmitPhoto(PathBuf),
    Status,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub enum ControlReply {
    Accepted,
    Status(GateStats),
    Error(String),
}

pub fn socket_path() -> PathBuf {
    if let Some(p) = env::var_os("SNACKGATE_SOCKET") {
        return PathBuf::from(p);
    }
    env::var_os("XDG_RUNTIME_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(env::temp_dir)
        .join("snackgate.sock")
}

pub fn send_command(msg: ControlMessage) -> io::Result<ControlReply> {
    let mut stream = UnixStream::connect(socket_path())?;
    serde_json::to_writer(&mut stream, &msg)?;
    stream.flush()?;
    let _ = stream.shutdown(Shutdown::Write);
    Ok(serde_json::from_reader(&mut stream)?)
}
