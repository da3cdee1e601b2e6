use timely::communication::Allocate;
use timely::dataflow::channels::pact::Pipeline;
use timely::dataflow::operators::generic::operator::Operator;
use timely::dataflow::operators::probe::{Handle as ProbeHandle, Probe};
use timely::dataflow::operators::{Inspect, Map};
use timely::dataflow::{InputHandle, Scope, Stream};
use timely::worker::Worker;
use tracing::{debug, error, warn};

use oee_core::{calculate, KpiRow, TelemetryEvent, WindowAggregate, WindowKpi};
use oee_quality::{EventValidator, ResultValidator};
use oee_runtime::metrics::MetricsRegistry;
use oee_runtime::{ConfigError, PipelineConfig};
use oee_windows::{AggregateError, AggregatorConfig, AggregatorStats, WindowAggregator};

use crate::{FaultSlot, WorkforceJoiner, WorkforceTable};

/// Everything a worker needs to build the KPI dataflow. Clones share the
/// workforce table, metrics and fault slot.
#[derive(Clone)]
pub struct PipelineContext {
    pub aggregator: AggregatorConfig,
    pub event_validator: EventValidator,
    pub result_validator: ResultValidator,
    pub workforce: WorkforceTable,
    pub metrics: MetricsRegistry,
    pub faults: FaultSlot,
    pub flush_on_close: bool,
}

impl PipelineContext {
    pub fn from_config(
        config: &PipelineConfig,
        workforce: WorkforceTable,
        metrics: MetricsRegistry,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            aggregator: config.aggregator_config(),
            event_validator: config.event_validator()?,
            result_validator: config.result_validator()?,
            workforce,
            metrics,
            faults: FaultSlot::default(),
            flush_on_close: config.flush_on_close,
        })
    }
}

/// Wire validate → aggregate → calculate → join → warn onto `events`.
pub fn kpi_dataflow<G>(
    events: &Stream<G, TelemetryEvent>,
    ctx: &PipelineContext,
) -> Result<Stream<G, KpiRow>, AggregateError>
where
    G: Scope<Timestamp = u64>,
{
    let aggregator = WindowAggregator::new(ctx.aggregator)?;

    let validator = ctx.event_validator.clone();
    let metrics = ctx.metrics.clone();
    let accepted = events.flat_map(move |event| {
        let outcome = validator.validate(event);
        metrics.record_rule_failures(&outcome.failed);
        if outcome.record.is_some() {
            metrics.inc_events_accepted(1);
        } else {
            metrics.inc_events_dropped(1);
        }
        outcome.record
    });

    let windows = aggregate_windows(
        &accepted,
        aggregator,
        ctx.flush_on_close,
        ctx.metrics.clone(),
        ctx.faults.clone(),
    );

    let metrics = ctx.metrics.clone();
    let kpis = windows.flat_map(move |aggregate| match calculate(&aggregate) {
        Ok(kpi) => {
            if kpi.oee.is_none() {
                metrics.inc_undefined_kpis(1);
            }
            Some(WindowKpi { aggregate, metrics: kpi })
        }
        Err(e) => {
            warn!(%e, "window skipped");
            None
        }
    });

    let joiner = WorkforceJoiner::new(ctx.workforce.clone());
    let metrics = ctx.metrics.clone();
    let joined = kpis.flat_map(move |kpi| {
        let row = joiner.join(kpi);
        if row.is_none() {
            metrics.inc_join_misses(1);
        }
        row
    });

    let validator = ctx.result_validator.clone();
    let metrics = ctx.metrics.clone();
    Ok(joined.map(move |row| {
        let row = validator.check(row);
        metrics.record_row_warnings(&row.warnings);
        metrics.inc_rows_emitted(1);
        row
    }))
}

/// Stateful window operator. Holds a capability at the input frontier so
/// windows still open when the input closes can be flushed.
fn aggregate_windows<G>(
    events: &Stream<G, TelemetryEvent>,
    mut aggregator: WindowAggregator,
    flush_on_close: bool,
    metrics: MetricsRegistry,
    faults: FaultSlot,
) -> Stream<G, WindowAggregate>
where
    G: Scope<Timestamp = u64>,
{
    events.unary_frontier(Pipeline, "WindowAggregate", move |capability, _info| {
        let mut retained = Some(capability);
        let mut buffer = Vec::new();
        let mut reported = AggregatorStats::default();

        move |input, output| {
            while let Some((time, data)) = input.next() {
                data.swap(&mut buffer);
                if aggregator.is_halted() {
                    buffer.clear();
                    continue;
                }
                let mut session = output.session(&time);
                for event in buffer.drain(..) {
                    match aggregator.observe(&event) {
                        Ok(step) => session.give_iterator(step.closed.into_iter()),
                        Err(fault) => {
                            faults.raise(fault);
                            break;
                        }
                    }
                }
                buffer.clear();
            }

            let frontier = input.frontier().frontier();
            if frontier.is_empty() {
                if let Some(cap) = retained.take() {
                    if flush_on_close && !aggregator.is_halted() {
                        let rest = aggregator.flush();
                        debug!(windows = rest.len(), "input closed, flushing open windows");
                        output.session(&cap).give_iterator(rest.into_iter());
                    }
                }
            } else if let Some(cap) = retained.as_mut() {
                if let Some(time) = frontier.iter().min() {
                    if cap.time() < time {
                        cap.downgrade(time);
                    }
                }
            }

            let now = aggregator.stats();
            if now != reported {
                metrics.record_aggregator(&reported, &now);
                reported = now;
            }
        }
    })
}

/// Owns the input side of one worker's KPI dataflow and steps it.
pub struct PipelineDriver {
    input: InputHandle<u64, TelemetryEvent>,
    probe: ProbeHandle<u64>,
    faults: FaultSlot,
    metrics: MetricsRegistry,
}

impl PipelineDriver {
    /// Build the dataflow on `worker`; every emitted row is handed to `sink`.
    pub fn build<A, F>(worker: &mut Worker<A>, ctx: &PipelineContext, mut sink: F) -> Result<Self, AggregateError>
    where
        A: Allocate,
        F: FnMut(&KpiRow) + 'static,
    {
        let mut input = InputHandle::new();
        let mut probe = ProbeHandle::new();
        worker.dataflow::<u64, _, _>(|scope| -> Result<(), AggregateError> {
            let events = input.to_stream(scope);
            kpi_dataflow(&events, ctx)?
                .inspect(move |row| sink(row))
                .probe_with(&mut probe);
            Ok(())
        })?;
        Ok(Self { input, probe, faults: ctx.faults.clone(), metrics: ctx.metrics.clone() })
    }

    pub fn epoch(&self) -> u64 {
        *self.input.time()
    }

    pub fn send(&mut self, event: TelemetryEvent) {
        self.metrics.inc_events_received(1);
        self.input.send(event);
    }

    /// Seal the current epoch and step until the dataflow has caught up.
    pub fn advance<A: Allocate>(&mut self, worker: &mut Worker<A>) -> Result<(), AggregateError> {
        let next = self.epoch() + 1;
        self.input.advance_to(next);
        while self.probe.less_than(self.input.time()) {
            worker.step();
            self.check()?;
        }
        Ok(())
    }

    /// Close the input and drain the dataflow.
    pub fn finish<A: Allocate>(self, worker: &mut Worker<A>) -> Result<(), AggregateError> {
        let Self { input, probe, faults, .. } = self;
        input.close();
        while !probe.done() {
            worker.step();
            faults.check()?;
        }
        faults.check()
    }

    fn check(&self) -> Result<(), AggregateError> {
        self.faults.check().map_err(|fault| {
            error!(%fault, epoch = self.epoch(), "pipeline halted");
            fault
        })
    }
}
