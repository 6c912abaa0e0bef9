//! Pipeline statistics.

use std::time::Duration;

use actuation::SequencerPhase;
use contracts::WireSnapshot;
use observability::RunSummary;

/// Statistics from a pipeline run
#[derive(Debug, Clone)]
pub struct PipelineStats {
    /// Counters gathered from every stage
    pub summary: RunSummary,

    /// Total duration of the run
    pub duration: Duration,

    /// Sequencer phase at shutdown
    pub final_phase: SequencerPhase,

    /// Last published state
    pub final_state: WireSnapshot,
}

impl PipelineStats {
    /// Captured frames per second
    pub fn fps(&self) -> f64 {
        if self.duration.as_secs_f64() > 0.0 {
            self.summary.frames_captured as f64 / self.duration.as_secs_f64()
        } else {
            0.0
        }
    }

    /// Print detailed summary
    pub fn print_summary(&self) {
        println!();
        print!("{}", self.summary);
        println!("Duration: {:.2}s ({:.2} fps)", self.duration.as_secs_f64(), self.fps());
        println!("Sequencer phase at shutdown: {:?}", self.final_phase);

        if !self.final_state.fill_levels.is_empty() {
            println!("Fill levels:");
            for (compartment, level) in &self.final_state.fill_levels {
                match level {
                    Some(percentage) => println!("  {}: {:.1}%", compartment, percentage),
                    None => println!("  {}: unknown", compartment),
                }
            }
        }
        println!("Final status: {}", self.final_state.system_status);
        println!();
    }
}
