use crate::domain::availability::DateAvailability;
use crate::error::Result;
use std::io::Write;

/// Writes `date,capacity,booked,available,status` rows.
pub struct AvailabilityWriter<W: Write> {
    writer: csv::Writer<W>,
}

impl<W: Write> AvailabilityWriter<W> {
    pub fn new(sink: W) -> Self {
        Self {
            writer: csv::Writer::from_writer(sink),
        }
    }

    pub fn write_all<I>(&mut self, rows: I) -> Result<()>
    where
        I: IntoIterator<Item = DateAvailability>,
    {
        let mut wrote_any = false;
        for row in rows {
            self.writer.serialize(&row)?;
            wrote_any = true;
        }
        if !wrote_any {
            self.writer
                .write_record(["date", "capacity", "booked", "available", "status"])?;
        }
        self.writer.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_writes_header_and_rows() {
        let date = "2026-11-01".parse().unwrap();
        let mut out = Vec::new();
        AvailabilityWriter::new(&mut out)
            .write_all([
                DateAvailability::new(date, 10, 8),
                DateAvailability::new(date.succ_opt().unwrap(), 10, 12),
            ])
            .unwrap();

        let text = String::from_utf8(out).unwrap();
        assert_eq!(
            text,
            "date,capacity,booked,available,status\n\
             2026-11-01,10,8,2,partially_booked\n\
             2026-11-02,10,12,0,fully_booked\n"
        );
    }

    #[test]
    fn test_empty_report_still_has_header() {
        let mut out = Vec::new();
        AvailabilityWriter::new(&mut out).write_all([]).unwrap();
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "date,capacity,booked,available,status\n"
        );
    }
}
