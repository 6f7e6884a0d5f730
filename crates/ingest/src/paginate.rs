use serde::Serialize;

use crate::source::{DeviceSource, MetricsSink};

/// Why pagination of one measurement stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PageEnd {
    /// A page came back with no rows.
    UpToDate,
    /// The last page carried no continuation cursor.
    Exhausted,
    /// The device returned a cursor that does not move forward.
    StalledCursor,
    DeviceError,
    WriteError,
}

impl PageEnd {
    pub fn is_failure(self) -> bool {
        matches!(self, Self::DeviceError | Self::WriteError)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PaginateOutcome {
    /// Pages that were written to the sink.
    pub pages: usize,
    pub samples: usize,
    /// `begin` of the last request sent.
    pub last_begin: i64,
    pub end: PageEnd,
}

/// Copies one measurement from `device` into `sink`, page by page, starting
/// at `start` and following the device's cursor.
pub async fn paginate<D, S>(
    device: &D,
    sink: &S,
    host: &str,
    measurement: &str,
    start: i64,
) -> PaginateOutcome
where
    D: DeviceSource,
    S: MetricsSink,
{
    let mut begin = start;
    let mut pages = 0;
    let mut samples = 0;

    let end = loop {
        let page = match device.fetch_page(host, measurement, begin).await {
            Ok(page) => page,
            Err(e) => {
                tracing::warn!(host, measurement, begin, error = %e, "device query failed");
                break PageEnd::DeviceError;
            }
        };
        if page.rows == 0 {
            break PageEnd::UpToDate;
        }

        if page.samples.is_empty() {
            // Rows were all null; nothing to write but the cursor still moves.
            tracing::debug!(host, measurement, begin, rows = page.rows, "page had no values");
        } else {
            if let Err(e) = sink.write_samples(host, measurement, &page.samples).await {
                tracing::warn!(host, measurement, begin, error = %e, "metric write failed");
                break PageEnd::WriteError;
            }
            pages += 1;
            samples += page.samples.len();
            tracing::debug!(host, measurement, begin, points = page.samples.len(), "page written");
        }

        match page.next {
            None => break PageEnd::Exhausted,
            Some(next) if next <= begin => {
                tracing::warn!(host, measurement, begin, next, "device cursor did not advance");
                break PageEnd::StalledCursor;
            }
            Some(next) => begin = next,
        }
    };

    PaginateOutcome {
        pages,
        samples,
        last_begin: begin,
        end,
    }
}
