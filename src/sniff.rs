use std::fs::File;
use std::io::Read;
use std::path::Path;

const WINDOW_SIZE: usize = 16 * 1024;
const OVERLAP: usize = 16;
const MARKER_LEN: usize = 10;

const PNG_MAGIC: [u8; 8] = [0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];

/// Picks a file extension from leading bytes. The remote's declared content
/// type is never trusted; unknown or truncated input yields `default`.
pub fn guess_extension<'a>(header: &[u8], default: &'a str) -> &'a str {
    if header.starts_with(b"GIF") {
        "gif"
    } else if header.starts_with(&[0xFF, 0xD8, 0xFF]) {
        "jpg"
    } else if header.starts_with(&PNG_MAGIC) {
        "png"
    } else if header.starts_with(b"BM") {
        "bmp"
    } else {
        default
    }
}

/// True when the file is a GIF with at least two frame control blocks.
/// A single graphic control extension is a static image. Unreadable files
/// count as not animated.
pub fn is_animated_gif(path: &Path) -> bool {
    matches!(count_frame_markers(path, 2), Ok(n) if n >= 2)
}

/// Counts occurrences of the graphic-control-extension marker
/// `00 21 F9 04 xx xx xx xx 00 (2C|21)`, reading the file in 16 KiB
/// windows. The last 16 bytes of each window are re-examined with the next
/// one so a marker split across the boundary is still seen; absolute
/// offsets guard against counting a marker in the overlap twice. Stops
/// as soon as `stop_at` markers are found.
fn count_frame_markers(path: &Path, stop_at: usize) -> std::io::Result<usize> {
    let mut file = File::open(path)?;
    let mut magic = [0u8; 3];
    if read_up_to(&mut file, &mut magic)? < 3 || &magic != b"GIF" {
        return Ok(0);
    }

    let mut count = 0usize;
    let mut buf = vec![0u8; WINDOW_SIZE + OVERLAP];
    let mut carry = 0usize;
    let mut base = 3u64;
    let mut next_match_at = 0u64;
    loop {
        let read = read_up_to(&mut file, &mut buf[carry..])?;
        if read == 0 {
            break;
        }
        let len = carry + read;
        let window = &buf[..len];
        let mut i = 0usize;
        while i + MARKER_LEN <= len {
            let abs = base + i as u64;
            if abs >= next_match_at && is_frame_marker(&window[i..i + MARKER_LEN]) {
                count += 1;
                if count >= stop_at {
                    return Ok(count);
                }
                next_match_at = abs + MARKER_LEN as u64;
                i += MARKER_LEN;
            } else {
                i += 1;
            }
        }
        carry = len.min(OVERLAP);
        let tail_start = len - carry;
        buf.copy_within(tail_start..len, 0);
        base += tail_start as u64;
    }
    Ok(count)
}

fn is_frame_marker(b: &[u8]) -> bool {
    b[0] == 0x00
        && b[1] == 0x21
        && b[2] == 0xF9
        && b[3] == 0x04
        && b[8] == 0x00
        && (b[9] == 0x2C || b[9] == 0x21)
}

fn read_up_to(file: &mut File, buf: &mut [u8]) -> std::io::Result<usize> {
    let mut total = 0;
    while total < buf.len() {
        let n = file.read(&mut buf[total..])?;
        if n == 0 {
            break;
        }
        total += n;
    }
    Ok(total)
}
