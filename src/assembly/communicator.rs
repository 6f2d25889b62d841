//! Message passing between ranks that each assemble a part of the mesh.
//!
//! [`SerialCommunicator`] is the trivial single-rank implementation. [`ThreadCommunicator`]
//! runs several ranks inside one process, one rank per thread, connected by channels. All
//! operations are collective: every rank of a group must call them in the same order.

use std::any::Any;
use std::fmt;
use std::fmt::{Display, Formatter};
use std::ops::Range;
use std::sync::mpsc::{channel, Receiver, Sender};
use std::sync::Mutex;

#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum CommunicationError {
    /// A peer rank hung up before the collective completed.
    Disconnected { peer: usize },
    /// A message had a different payload type than the collective expected.
    UnexpectedPayload { peer: usize },
    /// The number of outgoing buffers does not equal the number of ranks.
    WrongBufferCount { expected: usize, actual: usize },
}

impl Display for CommunicationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::Disconnected { peer } => write!(f, "rank {peer} disconnected during a collective operation"),
            Self::UnexpectedPayload { peer } => write!(f, "unexpected payload type received from rank {peer}"),
            Self::WrongBufferCount { expected, actual } => {
                write!(f, "expected {expected} outgoing buffers (one per rank), got {actual}")
            }
        }
    }
}

impl std::error::Error for CommunicationError {}

pub trait Communicator {
    fn rank(&self) -> usize;

    fn size(&self) -> usize;

    /// Sends `outgoing[r]` to rank `r` and returns the buffers received from every rank,
    /// indexed by source rank. The buffer addressed to the calling rank is returned in place.
    fn exchange<T: Send + 'static>(&self, outgoing: Vec<Vec<T>>) -> Result<Vec<Vec<T>>, CommunicationError>;

    /// Sum of `value` over all ranks. Every rank receives the same result, summed in rank order.
    fn all_reduce_sum(&self, value: f64) -> Result<f64, CommunicationError> {
        let outgoing: Vec<Vec<f64>> = (0..self.size()).map(|_| vec![value]).collect();
        let received = self.exchange(outgoing)?;
        Ok(received.iter().flatten().sum())
    }

    /// Blocks until every rank has reached the barrier.
    fn barrier(&self) -> Result<(), CommunicationError> {
        let outgoing: Vec<Vec<()>> = (0..self.size()).map(|_| Vec::new()).collect();
        self.exchange(outgoing).map(|_| ())
    }
}

impl<C: Communicator> Communicator for &C {
    fn rank(&self) -> usize {
        C::rank(self)
    }

    fn size(&self) -> usize {
        C::size(self)
    }

    fn exchange<T: Send + 'static>(&self, outgoing: Vec<Vec<T>>) -> Result<Vec<Vec<T>>, CommunicationError> {
        C::exchange(self, outgoing)
    }
}

fn check_buffer_count<T>(outgoing: &[Vec<T>], size: usize) -> Result<(), CommunicationError> {
    if outgoing.len() != size {
        return Err(CommunicationError::WrongBufferCount {
            expected: size,
            actual: outgoing.len(),
        });
    }
    Ok(())
}

/// A communicator for a single rank.
#[derive(Debug, Clone, Copy, Default)]
pub struct SerialCommunicator;

impl Communicator for SerialCommunicator {
    fn rank(&self) -> usize {
        0
    }

    fn size(&self) -> usize {
        1
    }

    fn exchange<T: Send + 'static>(&self, outgoing: Vec<Vec<T>>) -> Result<Vec<Vec<T>>, CommunicationError> {
        check_buffer_count(&outgoing, 1)?;
        Ok(outgoing)
    }
}

struct Message {
    source: usize,
    /// Index of the collective operation on the sending rank
    sequence: u64,
    payload: Box<dyn Any + Send>,
}

struct Inbox {
    receiver: Receiver<Message>,
    /// Messages that arrived early, belonging to later collectives
    pending: Vec<Message>,
    sequence: u64,
}

/// One rank of a group of ranks living in the same process.
///
/// Create a group with [`ThreadCommunicator::group`] and move each member onto its own thread.
pub struct ThreadCommunicator {
    rank: usize,
    senders: Vec<Sender<Message>>,
    inbox: Mutex<Inbox>,
}

impl fmt::Debug for ThreadCommunicator {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("ThreadCommunicator")
            .field("rank", &self.rank)
            .field("size", &self.senders.len())
            .finish()
    }
}

impl ThreadCommunicator {
    /// Creates `size` connected communicators, ordered by rank.
    ///
    /// # Panics
    ///
    /// Panics if `size` is zero.
    pub fn group(size: usize) -> Vec<Self> {
        assert!(size > 0, "a communicator group needs at least one rank");
        let (senders, receivers): (Vec<_>, Vec<_>) = (0..size).map(|_| channel()).unzip();
        receivers
            .into_iter()
            .enumerate()
            .map(|(rank, receiver)| Self {
                rank,
                senders: senders.clone(),
                inbox: Mutex::new(Inbox {
                    receiver,
                    pending: Vec::new(),
                    sequence: 0,
                }),
            })
            .collect()
    }
}

impl Communicator for ThreadCommunicator {
    fn rank(&self) -> usize {
        self.rank
    }

    fn size(&self) -> usize {
        self.senders.len()
    }

    fn exchange<T: Send + 'static>(&self, outgoing: Vec<Vec<T>>) -> Result<Vec<Vec<T>>, CommunicationError> {
        let size = self.size();
        check_buffer_count(&outgoing, size)?;

        // A poisoned lock can only come from a panic on this rank's own thread
        let mut inbox = self.inbox.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        let sequence = inbox.sequence;
        inbox.sequence += 1;

        let mut received: Vec<Option<Vec<T>>> = (0..size).map(|_| None).collect();
        for (peer, buffer) in outgoing.into_iter().enumerate() {
            if peer == self.rank {
                received[peer] = Some(buffer);
                continue;
            }
            let message = Message {
                source: self.rank,
                sequence,
                payload: Box::new(buffer),
            };
            self.senders[peer]
                .send(message)
                .map_err(|_| CommunicationError::Disconnected { peer })?;
        }

        let accept = |message: Message, received: &mut Vec<Option<Vec<T>>>| {
            let peer = message.source;
            let buffer = message
                .payload
                .downcast::<Vec<T>>()
                .map_err(|_| CommunicationError::UnexpectedPayload { peer })?;
            received[peer] = Some(*buffer);
            Ok::<(), CommunicationError>(())
        };

        let early = std::mem::take(&mut inbox.pending);
        for message in early {
            if message.sequence == sequence {
                accept(message, &mut received)?;
            } else {
                inbox.pending.push(message);
            }
        }

        while let Some(peer) = received.iter().position(Option::is_none) {
            let message = inbox
                .receiver
                .recv()
                .map_err(|_| CommunicationError::Disconnected { peer })?;
            if message.sequence == sequence {
                accept(message, &mut received)?;
            } else {
                inbox.pending.push(message);
            }
        }

        Ok(received.into_iter().flatten().collect())
    }
}

/// A static partition of elements into contiguous per-rank ranges.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElementPartition {
    offsets: Vec<usize>,
}

impl ElementPartition {
    /// Splits `num_elements` elements into `num_ranks` ranges whose sizes differ by at most one.
    ///
    /// # Panics
    ///
    /// Panics if `num_ranks` is zero.
    pub fn uniform(num_elements: usize, num_ranks: usize) -> Self {
        Self {
            offsets: uniform_offsets(num_elements, num_ranks),
        }
    }

    /// A partition where a single rank owns everything.
    pub fn serial(num_elements: usize) -> Self {
        Self::uniform(num_elements, 1)
    }

    pub fn num_ranks(&self) -> usize {
        self.offsets.len() - 1
    }

    pub fn num_elements(&self) -> usize {
        self.offsets[self.offsets.len() - 1]
    }

    pub fn owned_range(&self, rank: usize) -> Range<usize> {
        self.offsets[rank]..self.offsets[rank + 1]
    }

    pub fn owner(&self, element: usize) -> Option<usize> {
        owner_of(&self.offsets, element)
    }
}

/// Row ownership of the global system: every rank owns a contiguous range of DOFs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DofOwnership {
    offsets: Vec<usize>,
}

impl DofOwnership {
    pub fn uniform(num_dofs: usize, num_ranks: usize) -> Self {
        Self {
            offsets: uniform_offsets(num_dofs, num_ranks),
        }
    }

    pub fn serial(num_dofs: usize) -> Self {
        Self::uniform(num_dofs, 1)
    }

    pub fn num_ranks(&self) -> usize {
        self.offsets.len() - 1
    }

    pub fn num_dofs(&self) -> usize {
        self.offsets[self.offsets.len() - 1]
    }

    pub fn owned_range(&self, rank: usize) -> Range<usize> {
        self.offsets[rank]..self.offsets[rank + 1]
    }

    /// The rank owning `dof`, or `None` if the index is out of bounds.
    pub fn owner(&self, dof: usize) -> Option<usize> {
        owner_of(&self.offsets, dof)
    }
}

fn uniform_offsets(n: usize, parts: usize) -> Vec<usize> {
    assert!(parts > 0, "number of ranks must be positive");
    let base = n / parts;
    let remainder = n % parts;
    let mut offsets = Vec::with_capacity(parts + 1);
    offsets.push(0);
    for p in 0..parts {
        let size = base + usize::from(p < remainder);
        offsets.push(offsets[p] + size);
    }
    offsets
}

fn owner_of(offsets: &[usize], index: usize) -> Option<usize> {
    if index >= offsets[offsets.len() - 1] {
        return None;
    }
    // First offset strictly greater than the index marks the end of the owner's range
    Some(offsets.partition_point(|&offset| offset <= index) - 1)
}
