//! Shift reports.
//!
//! An open or suspended session gets an interim (X) report, built fresh on
//! every call and never saved. A closed session gets its end-of-shift (Z)
//! report: built and saved on the first call, returned unchanged after.

use tracing::{info, warn};

use tally_core::report::{report_number, report_sequence_scope};
use tally_core::{generate_report, ReportKind, Session, ShiftReport};

use crate::engine::PosEngine;
use crate::error::EngineResult;

impl PosEngine {
    pub async fn generate_report(
        &self,
        session_id: &str,
        actor: &str,
    ) -> EngineResult<ShiftReport> {
        let session = self.session(session_id).await?;

        match ReportKind::for_session(&session) {
            ReportKind::Interim => {
                let report = self.build_report(&session, actor).await?;
                info!(session_id, number = %report.report_number, "Interim report generated");
                Ok(report)
            }
            ReportKind::EndOfShift => {
                let _guard = self.lock_session(session_id).await;
                if let Some(report) = self.store.load_report(session_id).await? {
                    return Ok(report);
                }

                let report = self.build_report(&session, actor).await?;
                self.store.save_report(&report).await?;
                info!(
                    session_id,
                    number = %report.report_number,
                    net_sales = %report.sales.net_sales,
                    "End-of-shift report sealed"
                );
                Ok(report)
            }
        }
    }

    async fn build_report(&self, session: &Session, actor: &str) -> EngineResult<ShiftReport> {
        let now = self.now();
        // A closed session carries the summary sealed at close.
        let (orders, returns) = if session.summary.is_some() {
            (Vec::new(), Vec::new())
        } else {
            (
                self.store.load_orders(&session.order_ids).await?,
                self.store.load_returns(&session.return_ids).await?,
            )
        };

        let kind = ReportKind::for_session(session);
        let date = now.date_naive();
        let sequence = self
            .store
            .next_sequence(&report_sequence_scope(date))
            .await?;

        let report = generate_report(
            session,
            &orders,
            &returns,
            report_number(kind, date, sequence),
            actor,
            now,
        );
        if let Some(variance) = report.cash_variance() {
            warn!(
                session_id = %session.id,
                variance = %variance,
                "Report shows cash variance"
            );
        }
        Ok(report)
    }
}
