//! TUN device.
use async_std::fs::File;
use async_std::io::Write;
use async_std::prelude::*;
use std::io::{Error, ErrorKind, Result};
use std::os::unix::io::AsRawFd;

const TUN_PATH: &str = "/dev/net/tun";
const TUNSETIFF: u64 = 0x4004_54ca;
const IFF_TUN: libc::c_short = 0x0001;
const IFF_NO_PI: libc::c_short = 0x1000;

#[repr(C)]
struct IfReq {
    name: [libc::c_char; libc::IFNAMSIZ],
    flags: libc::c_short,
    pad: [u8; 22],
}

fn if_name(name: &str) -> Result<[libc::c_char; libc::IFNAMSIZ]> {
    if name.is_empty() || name.len() >= libc::IFNAMSIZ || name.contains('\0') {
        return Err(Error::new(
            ErrorKind::InvalidInput,
            format!("invalid interface name {:?}", name),
        ));
    }
    let mut buf = [0; libc::IFNAMSIZ];
    for (dst, src) in buf.iter_mut().zip(name.bytes()) {
        *dst = src as libc::c_char;
    }
    Ok(buf)
}

fn from_if_name(buf: &[libc::c_char]) -> String {
    let bytes: Vec<u8> = buf
        .iter()
        .take_while(|c| **c != 0)
        .map(|c| *c as u8)
        .collect();
    String::from_utf8_lossy(&bytes).into_owned()
}

/// A TUN device without packet information headers.
pub struct Tun {
    file: File,
    name: String,
}

impl Tun {
    /// Attaches to the TUN device `name`, creating it if needed.
    pub fn open(name: &str) -> Result<Self> {
        let mut req = IfReq {
            name: if_name(name)?,
            flags: IFF_TUN | IFF_NO_PI,
            pad: [0; 22],
        };
        let file = std::fs::OpenOptions::new()
            .read(true)
            .write(true)
            .open(TUN_PATH)?;
        let res = unsafe { libc::ioctl(file.as_raw_fd(), TUNSETIFF as _, &mut req as *mut IfReq) };
        if res < 0 {
            return Err(Error::last_os_error());
        }
        Ok(Self {
            file: File::from(file),
            name: from_if_name(&req.name),
        })
    }

    /// Name the kernel gave the device.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Reads one packet, `0` when the device is gone.
    pub async fn recv(&mut self, buf: &mut [u8]) -> Result<usize> {
        self.file.read(buf).await
    }

    /// Writes one packet.
    pub async fn send(&mut self, frame: &[u8]) -> Result<()> {
        write_frame(&mut self.file, frame).await
    }
}

/// The device takes one packet per write.
async fn write_frame<W: Write + Unpin>(writer: &mut W, frame: &[u8]) -> Result<()> {
    let written = writer.write(frame).await?;
    if written != frame.len() {
        return Err(Error::new(
            ErrorKind::WriteZero,
            format!("wrote {} of {} bytes", written, frame.len()),
        ));
    }
    writer.flush().await
}
