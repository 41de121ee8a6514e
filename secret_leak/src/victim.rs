use cache_side_channel::VictimTrigger;
use std::io::{self, StdoutLock, Write};

/// Asks the victim for a position by writing it as a right-aligned two-digit
/// decimal followed by a newline. The victim reads the record and touches the
/// probe slot of its secret byte at that position.
#[derive(Debug)]
pub struct WriterTrigger<W: Write> {
    out: W,
}

impl<W: Write> WriterTrigger<W> {
    pub fn new(out: W) -> Self {
        WriterTrigger { out }
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

impl WriterTrigger<StdoutLock<'static>> {
    pub fn stdout() -> Self {
        WriterTrigger::new(io::stdout().lock())
    }
}

pub fn encode_position(position: usize) -> String {
    format!("{:2}\n", position)
}

impl<W: Write> VictimTrigger for WriterTrigger<W> {
    fn trigger(&mut self, position: usize) -> io::Result<()> {
        // One write per record, the victim reads it as a unit.
        self.out.write_all(encode_position(position).as_bytes())?;
        self.out.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_are_three_bytes() {
        assert_eq!(encode_position(0), " 0\n");
        assert_eq!(encode_position(7), " 7\n");
        assert_eq!(encode_position(48), "48\n");
        assert_eq!(encode_position(99), "99\n");
        for p in 0..=99 {
            assert_eq!(encode_position(p).len(), 3);
        }
    }

    #[test]
    fn trigger_writes_records_in_order() {
        let mut trigger = WriterTrigger::new(Vec::new());
        for p in [48, 49, 5] {
            trigger.trigger(p).unwrap();
        }
        assert_eq!(trigger.into_inner(), b"48\n49\n 5\n".to_vec());
    }

    struct Closed;

    impl Write for Closed {
        fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
            Err(io::Error::new(io::ErrorKind::BrokenPipe, "closed"))
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn write_errors_surface() {
        let mut trigger = WriterTrigger::new(Closed);
        let err = trigger.trigger(1).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::BrokenPipe);
    }
}
