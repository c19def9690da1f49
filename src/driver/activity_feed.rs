//! Change feed backed by `<store> activity --follow --town --json`.
//!
//! Each subscription spawns a fresh follower process. The process is owned
//! by the returned stream and killed when the stream is dropped, so
//! cancelling the convoy watcher needs no extra cleanup.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use futures_util::{stream, StreamExt};
use tokio::process::{Child, ChildStdout, Command};
use tokio_util::codec::{FramedRead, LinesCodec, LinesCodecError};
use tracing::{debug, warn};

use super::{ChangeFeed, DriverFuture, FeedStream};
use crate::AppError;

/// Maximum accepted feed line length: 1 MiB.
pub const MAX_LINE_BYTES: usize = 1_048_576;

const FOLLOW_ARGS: &[&str] = &["activity", "--follow", "--town", "--json"];

/// Spawns the store's activity follower.
#[derive(Debug, Clone)]
pub struct ActivityFeed {
    program: String,
    work_dir: PathBuf,
}

impl ActivityFeed {
    /// Feed using the store CLI `program`, run from `work_dir`.
    #[must_use]
    pub fn new(program: impl Into<String>, work_dir: &Path) -> Self {
        Self {
            program: program.into(),
            work_dir: work_dir.to_path_buf(),
        }
    }
}

type Lines = FramedRead<ChildStdout, LinesCodec>;

/// Next usable line. Over-long lines are skipped; I/O errors end the stream
/// after being yielded once.
async fn next_line(
    state: Option<(Child, Lines)>,
) -> Option<(crate::Result<String>, Option<(Child, Lines)>)> {
    let (child, mut lines) = state?;
    loop {
        match lines.next().await {
            Some(Ok(line)) => return Some((Ok(line), Some((child, lines)))),
            Some(Err(LinesCodecError::MaxLineLengthExceeded)) => {
                warn!("activity feed: line exceeds {MAX_LINE_BYTES} bytes, skipping");
            }
            Some(Err(LinesCodecError::Io(err))) => {
                return Some((Err(AppError::Feed(format!("read failed: {err}"))), None));
            }
            None => {
                debug!("activity feed: follower exited");
                return None;
            }
        }
    }
}

impl ChangeFeed for ActivityFeed {
    fn subscribe(&self) -> DriverFuture<'_, FeedStream> {
        Box::pin(async move {
            let mut child = Command::new(&self.program)
                .args(FOLLOW_ARGS)
                .current_dir(&self.work_dir)
                .stdin(Stdio::null())
                .stdout(Stdio::piped())
                .stderr(Stdio::null())
                .kill_on_drop(true)
                .spawn()
                .map_err(|err| {
                    AppError::Feed(format!("failed to start {} activity: {err}", self.program))
                })?;

            let stdout = child
                .stdout
                .take()
                .ok_or_else(|| AppError::Feed("failed to capture follower stdout".into()))?;
            let lines = FramedRead::new(stdout, LinesCodec::new_with_max_length(MAX_LINE_BYTES));

            let feed: FeedStream = Box::pin(stream::unfold(Some((child, lines)), next_line));
            Ok(feed)
        })
    }
}
