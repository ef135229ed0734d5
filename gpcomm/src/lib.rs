//! Collective-communication service.
//!
//! Every reduction the numerical core performs goes through a
//! [`Communicator`] handed in by the caller. All ranks of a communicator
//! must issue the same collectives in the same order.

pub trait Communicator {
    fn rank(&self) -> usize;

    fn size(&self) -> usize;

    /// Sum of `x` over all ranks, returned on every rank.
    fn sum_scalar(&self, x: f64) -> f64;

    /// In-place element-wise sum over all ranks.
    fn sum_slice(&self, buf: &mut [f64]);

    /// Overwrite `buf` on every rank with the content held by `root`.
    fn broadcast_slice(&self, buf: &mut [f64], root: usize);

    fn barrier(&self);

    fn is_root(&self) -> bool {
        self.rank() == 0
    }
}

/// Single-rank communicator: every collective is the identity.
#[derive(Debug, Default, Clone, Copy)]
pub struct SerialComm;

impl SerialComm {
    pub fn new() -> SerialComm {
        SerialComm
    }
}

impl Communicator for SerialComm {
    fn rank(&self) -> usize {
        0
    }

    fn size(&self) -> usize {
        1
    }

    fn sum_scalar(&self, x: f64) -> f64 {
        x
    }

    fn sum_slice(&self, _buf: &mut [f64]) {}

    fn broadcast_slice(&self, _buf: &mut [f64], root: usize) {
        assert_eq!(root, 0, "broadcast root out of range for a serial communicator");
    }

    fn barrier(&self) {}
}

#[test]
fn test_serial_comm() {
    let comm = SerialComm::new();

    assert_eq!(comm.rank(), 0);
    assert_eq!(comm.size(), 1);
    assert!(comm.is_root());
    assert_eq!(comm.sum_scalar(2.5), 2.5);

    let mut buf = [1.0, 2.0, 3.0];
    comm.sum_slice(&mut buf);
    comm.broadcast_slice(&mut buf, 0);
    comm.barrier();

    assert_eq!(buf, [1.0, 2.0, 3.0]);
}

#[test]
#[should_panic]
fn test_serial_comm_broadcast_bad_root() {
    let comm = SerialComm::new();
    let mut buf = [0.0; 2];
    comm.broadcast_slice(&mut buf, 1);
}
