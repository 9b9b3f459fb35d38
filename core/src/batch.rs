use crate::record::Record;

/// An ordered group of records submitted to the sink together.
///
/// A batch is never modified once assembled; a failing batch is replaced by
/// the sub-batches returned from [`Batch::split`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Batch {
    records: Vec<Record>,
}

impl Batch {
    pub fn new(records: Vec<Record>) -> Self {
        Self { records }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn records(&self) -> &[Record] {
        &self.records
    }

    /// Newline-delimited payloads, one enveloped record per line.
    pub fn to_payload(&self) -> String {
        let size = self.records.iter().map(|r| r.payload().len() + 1).sum();
        let mut out = String::with_capacity(size);
        for record in &self.records {
            out.push_str(record.payload());
            out.push('\n');
        }
        out
    }

    /// Partitions the batch into `parts` contiguous sub-batches whose lengths
    /// differ by at most one, longer parts first. Never yields empty parts.
    pub fn split(&self, parts: usize) -> Vec<Batch> {
        let parts = parts.clamp(1, self.len().max(1));
        let base = self.len() / parts;
        let extra = self.len() % parts;

        let mut out = Vec::with_capacity(parts);
        let mut start = 0;
        for i in 0..parts {
            let size = base + usize::from(i < extra);
            if size == 0 {
                continue;
            }
            out.push(Batch::new(self.records[start..start + size].to_vec()));
            start += size;
        }
        out
    }
}

/// Collects records until the controller's current target is reached.
#[derive(Debug, Default)]
pub struct BatchAssembler {
    pending: Vec<Record>,
}

impl BatchAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Appends a record and hands back the full batch once `target` records
    /// are pending.
    pub fn push(&mut self, record: Record, target: usize) -> Option<Batch> {
        self.pending.push(record);
        if self.pending.len() >= target.max(1) {
            Some(Batch::new(std::mem::take(&mut self.pending)))
        } else {
            None
        }
    }

    /// Drains whatever is pending, possibly nothing.
    pub fn finish(&mut self) -> Batch {
        Batch::new(std::mem::take(&mut self.pending))
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::record::RecordValidator;

    pub(crate) fn records(n: usize) -> Vec<Record> {
        let validator = RecordValidator::new(Some("data"));
        (0..n)
            .filter_map(|i| validator.validate(&format!(r#"{{"seq":{i}}}"#)))
            .collect()
    }

    #[test]
    fn test_assembler_yields_at_target() {
        let mut assembler = BatchAssembler::new();
        let mut yielded = Vec::new();
        for record in records(12) {
            if let Some(batch) = assembler.push(record, 5) {
                yielded.push(batch);
            }
        }
        assert_eq!(yielded.len(), 2);
        assert!(yielded.iter().all(|b| b.len() == 5));
        assert_eq!(assembler.len(), 2);

        let tail = assembler.finish();
        assert_eq!(tail.len(), 2);
        assert!(assembler.is_empty());
        assert!(assembler.finish().is_empty());
    }

    #[test]
    fn test_assembler_preserves_order() {
        let input = records(4);
        let mut assembler = BatchAssembler::new();
        let mut batch = None;
        for record in input.clone() {
            batch = assembler.push(record, 4);
        }
        assert_eq!(batch.unwrap().records(), input.as_slice());
    }

    #[test]
    fn test_assembler_honours_target_changes() {
        let mut assembler = BatchAssembler::new();
        let mut input = records(6).into_iter();
        assert!(assembler.push(input.next().unwrap(), 4).is_none());
        assert!(assembler.push(input.next().unwrap(), 4).is_none());
        // target shrank below what is already pending
        let batch = assembler.push(input.next().unwrap(), 2).unwrap();
        assert_eq!(batch.len(), 3);
    }

    #[test]
    fn test_split_is_balanced_and_contiguous() {
        let batch = Batch::new(records(10));
        let parts = batch.split(4);
        let sizes: Vec<usize> = parts.iter().map(Batch::len).collect();
        assert_eq!(sizes, vec![3, 3, 2, 2]);

        let rejoined: Vec<Record> = parts
            .iter()
            .flat_map(|p| p.records().iter().cloned())
            .collect();
        assert_eq!(rejoined.as_slice(), batch.records());
    }

    #[test]
    fn test_split_even() {
        let parts = Batch::new(records(8)).split(2);
        assert_eq!(parts.len(), 2);
        assert!(parts.iter().all(|p| p.len() == 4));
    }

    #[test]
    fn test_split_never_yields_empty_parts() {
        let parts = Batch::new(records(3)).split(8);
        assert_eq!(parts.len(), 3);
        assert!(parts.iter().all(|p| p.len() == 1));
        assert!(Batch::default().split(4).is_empty());
    }

    #[test]
    fn test_payload_is_newline_delimited() {
        let batch = Batch::new(records(2));
        assert_eq!(
            batch.to_payload(),
            "{\"data\":{\"seq\":0}}\n{\"data\":{\"seq\":1}}\n"
        );
    }
}
