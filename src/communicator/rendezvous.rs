use parking_lot::{Condvar, Mutex};

struct Inner<In, Out> {
    generation: u64,
    arrived: usize,
    inputs: Vec<Option<In>>,
    outputs: Vec<Option<Out>>,
}

/// A reusable N-party rendezvous: every participant calls [`Rendezvous::rendezvous`]
/// with its input and blocks until all `n` have arrived, at which point the last
/// arriver runs `mingle` once (single-threaded, still holding the lock) to compute
/// one output per participant, then all `n` resume. The barrier resets itself so
/// it can be driven through any number of rounds by the same fixed set of threads.
pub struct Rendezvous<In, Out> {
    n: usize,
    inner: Mutex<Inner<In, Out>>,
    condvar: Condvar,
}

impl<In, Out> Rendezvous<In, Out> {
    pub fn new(n: usize) -> Self {
        assert!(n > 0, "a rendezvous needs at least one participant");
        Rendezvous {
            n,
            inner: Mutex::new(Inner {
                generation: 0,
                arrived: 0,
                inputs: (0..n).map(|_| None).collect(),
                outputs: (0..n).map(|_| None).collect(),
            }),
            condvar: Condvar::new(),
        }
    }

    /// `tid` must be a stable index in `[0, n)`, disjoint across concurrent callers.
    pub fn rendezvous(&self, tid: usize, input: In, mingle: impl FnOnce(Vec<In>) -> Vec<Out>) -> Out {
        let mut inner = self.inner.lock();
        let my_generation = inner.generation;
        inner.inputs[tid] = Some(input);
        inner.arrived += 1;

        if inner.arrived == self.n {
            let inputs: Vec<In> = inner.inputs.iter_mut().map(|slot| slot.take().unwrap()).collect();
            let outputs = mingle(inputs);
            assert_eq!(outputs.len(), self.n, "mingle must produce exactly one output per participant");
            inner.outputs = outputs.into_iter().map(Some).collect();
            inner.arrived = 0;
            inner.generation = inner.generation.wrapping_add(1);
            self.condvar.notify_all();
        } else {
            while inner.generation == my_generation {
                self.condvar.wait(&mut inner);
            }
        }

        inner.outputs[tid].take().expect("output already consumed for this round")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn single_participant_does_not_deadlock() {
        let r: Rendezvous<i32, i32> = Rendezvous::new(1);
        let out = r.rendezvous(0, 7, |inputs| vec![inputs[0] * 2]);
        assert_eq!(out, 14);
    }

    #[test]
    fn all_participants_see_the_same_mingled_output() {
        let r: Arc<Rendezvous<i32, i32>> = Arc::new(Rendezvous::new(4));
        let handles: Vec<_> = (0..4)
            .map(|tid| {
                let r = r.clone();
                thread::spawn(move || r.rendezvous(tid, tid as i32, |inputs| {
                    let sum: i32 = inputs.iter().sum();
                    vec![sum; inputs.len()]
                }))
            })
            .collect();
        let results: Vec<i32> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert!(results.iter().all(|&r| r == 6)); // 0+1+2+3
    }

    #[test]
    fn is_reenterable_across_multiple_rounds() {
        let r: Arc<Rendezvous<i32, i32>> = Arc::new(Rendezvous::new(2));
        for round in 0..5 {
            let r0 = r.clone();
            let t = thread::spawn(move || r0.rendezvous(0, round, |inputs| vec![inputs[0] + inputs[1]; 2]));
            let out1 = r.rendezvous(1, round * 10, |inputs| vec![inputs[0] + inputs[1]; 2]);
            let out0 = t.join().unwrap();
            assert_eq!(out0, round + round * 10);
            assert_eq!(out1, out0);
        }
    }
}
