use std::os::fd::{AsRawFd,OwnedFd};

use nix::fcntl::OFlag;
use nix::unistd;

#[derive(Debug)]
pub struct PipeLink {
	read: OwnedFd,
	write: OwnedFd,
}

/// The N-1 links of an N-stage pipeline. Every endpoint is closed when the
/// value is dropped, in the parent as well as in each forked child.
#[derive(Debug)]
pub struct PipeLinks {
	links: Vec<PipeLink>,
	stages: usize,
}

impl PipeLinks {
	/// Allocates every link up front so that each child sees all of them.
	pub fn allocate(stages: usize) -> nix::Result<PipeLinks> {
		let count = stages.saturating_sub(1);
		let mut links = Vec::with_capacity(count);
		for _ in 0 .. count {
			let (read, write) = unistd::pipe2(OFlag::O_CLOEXEC)?;
			links.push(PipeLink { read: read, write: write });
		}
		Ok(PipeLinks { links: links, stages: stages })
	}

	pub fn len(&self) -> usize {
		self.links.len()
	}

	/// Child side: rewires stdin/stdout of stage `index`, then closes every
	/// original endpoint. Only the duplicates on fd 0 and 1 survive.
	pub fn wire(&mut self, index: usize) -> nix::Result<()> {
		if index > 0 {
			unistd::dup2(self.links[index - 1].read.as_raw_fd(), libc::STDIN_FILENO)?;
		}
		if index + 1 < self.stages {
			unistd::dup2(self.links[index].write.as_raw_fd(), libc::STDOUT_FILENO)?;
		}
		self.close();
		Ok(())
	}

	pub fn close(&mut self) {
		self.links.clear();
	}
}
