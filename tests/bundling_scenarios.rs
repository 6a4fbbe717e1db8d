//! Bundling Scenarios
//!
//! End-to-end runs of the bundler over small hand-built networks:
//!
//! ```text
//! A(0,0) ---- B(5,0) ---- C(10,0)        collinear line
//!
//!     N(5,8)
//!    /      \
//! W(0,0)----E(10,0)                      triangle with a long detour
//! ```

use std::sync::Arc;

use arrow::array::{ArrayRef, Float64Array, Int64Array, RecordBatch, StringArray};
use edge_path_bundler::loader::{flow_schema, location_schema};
use edge_path_bundler::test_utils::{find_flow, TestFlowBuilder};
use edge_path_bundler::{
    bundle_flows, flows_from_batches, locations_from_batches, BundleLayout, Bundler,
    BundlerConfig, ConfigurationError, FlowOutcome,
};

fn line_builder() -> TestFlowBuilder {
    TestFlowBuilder::new()
        .add_location("A", 0.0, 0.0)
        .add_location("B", 5.0, 0.0)
        .add_location("C", 10.0, 0.0)
}

/// W-E is 10 long; the detour over N is about 18.9
fn triangle_builder() -> TestFlowBuilder {
    TestFlowBuilder::new()
        .add_location("W", 0.0, 0.0)
        .add_location("E", 10.0, 0.0)
        .add_location("N", 5.0, 8.0)
        .add_flow("W", "E", 1)
        .add_flow("W", "N", 1)
        .add_flow("N", "E", 1)
}

fn run(builder: TestFlowBuilder, config: &BundlerConfig) -> BundleLayout {
    let (locations, flows) = builder.records();
    bundle_flows(&locations, &flows, config).expect("bundling failed")
}

fn assert_every_flow_classified(layout: &BundleLayout) {
    let stats = layout.stats;
    assert_eq!(layout.outcomes.len(), stats.total_flows);
    assert_eq!(
        stats.bundled + stats.absorbed + stats.too_long + stats.no_path,
        stats.total_flows,
        "stats: {:?}",
        stats
    );
    assert_eq!(layout.bundles.len(), stats.bundled);
}

/// Two locations and a single flow: nothing to route through
#[test]
fn test_single_flow_drawn_straight() {
    let builder = TestFlowBuilder::new()
        .add_location("A", 0.0, 0.0)
        .add_location("B", 10.0, 0.0)
        .add_flow("A", "B", 5);

    let layout = run(builder, &BundlerConfig::default());

    assert!(layout.bundles.is_empty());
    assert_eq!(layout.stats.no_path, 1);
    assert_eq!(layout.unbundled.len(), 1);
    let straight = &layout.unbundled[0];
    assert_eq!((straight.origin.as_str(), straight.destination.as_str()), ("A", "B"));
    assert_eq!(straight.count, 5);
    assert_eq!(straight.line.0.len(), 2);
    assert_every_flow_classified(&layout);
}

/// A-C is the heaviest flow and is rerouted over A-B-C (length 10, not above 2 * 10)
#[test]
fn test_collinear_flow_bundled() {
    let mut network = line_builder()
        .add_flow("A", "C", 20)
        .add_flow("A", "B", 1)
        .add_flow("B", "C", 1)
        .build(2.0);

    let layout = Bundler::new(&mut network).run().unwrap();

    assert_eq!(layout.bundles.len(), 1);
    let bundle = &layout.bundles[0];
    assert_eq!(bundle.origin, "A");
    assert_eq!(bundle.destination, "C");
    assert_eq!(bundle.count, 20);

    let ab = find_flow(&network, "A_B").unwrap();
    let bc = find_flow(&network, "B_C").unwrap();
    let ac = find_flow(&network, "A_C").unwrap();
    assert_eq!(bundle.path, vec![ab, bc]);
    assert!(network.flow(ab).unwrap().locked);
    assert!(network.flow(bc).unwrap().locked);
    assert!(network.flow(ac).unwrap().skip);

    assert_eq!(layout.outcome(ac), Some(FlowOutcome::Bundled));
    assert_eq!(layout.outcome(ab), Some(FlowOutcome::Absorbed));
    assert_eq!(layout.outcome(bc), Some(FlowOutcome::Absorbed));

    // The curve starts and ends on the flow's endpoints
    let first = bundle.curve.0.first().unwrap();
    let last = bundle.curve.0.last().unwrap();
    assert_eq!((first.x, first.y), (0.0, 0.0));
    assert_eq!((last.x, last.y), (10.0, 0.0));
    assert_every_flow_classified(&layout);
}

/// A route exactly as long as the direct distance is still accepted at k = 1
#[test]
fn test_route_equal_to_direct_distance_bundled_at_unit_threshold() {
    let builder = line_builder()
        .add_flow("A", "C", 20)
        .add_flow("A", "B", 1)
        .add_flow("B", "C", 1);
    let config = BundlerConfig {
        detour_threshold: 1.0,
        ..BundlerConfig::default()
    };

    let layout = run(builder, &config);

    assert_eq!(layout.stats.bundled, 1);
    assert_eq!(layout.stats.too_long, 0);
    assert_eq!(layout.bundles[0].od_id, "A_C");
    assert_every_flow_classified(&layout);
}

/// Just below k = 1 the same route is a detour, and so is every other
#[test]
fn test_route_equal_to_direct_distance_too_long_below_unit_threshold() {
    let builder = line_builder()
        .add_flow("A", "C", 20)
        .add_flow("A", "B", 1)
        .add_flow("B", "C", 1);
    let config = BundlerConfig {
        detour_threshold: 0.99,
        ..BundlerConfig::default()
    };

    let layout = run(builder, &config);

    assert!(layout.bundles.is_empty());
    assert_eq!(layout.stats.too_long, 3);
    assert_every_flow_classified(&layout);
}

/// The detour over N is under twice the direct distance with the default threshold
#[test]
fn test_triangle_bundled_with_default_threshold() {
    let layout = run(triangle_builder(), &BundlerConfig::default());

    assert_eq!(layout.stats.bundled, 1);
    assert_eq!(layout.bundles[0].od_id, "W_E");
    assert_eq!(layout.stats.absorbed, 2);
    assert_every_flow_classified(&layout);
}

/// With a tight threshold every flow rejects its detour and stays straight
#[test]
fn test_triangle_too_long_with_tight_threshold() {
    let config = BundlerConfig {
        detour_threshold: 1.5,
        ..BundlerConfig::default()
    };
    let layout = run(triangle_builder(), &config);

    assert!(layout.bundles.is_empty());
    assert_eq!(layout.stats.too_long, 3);
    assert_eq!(layout.unbundled.len(), 3);
    assert_every_flow_classified(&layout);
}

#[test]
fn test_raising_threshold_never_unbundles() {
    let thresholds = [1.0, 1.5, 1.9, 2.0, 3.0];
    let mut previous: Option<BundleLayout> = None;

    for k in thresholds {
        let config = BundlerConfig {
            detour_threshold: k,
            ..BundlerConfig::default()
        };
        let layout = run(triangle_builder(), &config);

        if let Some(prev) = &previous {
            for (before, after) in prev.outcomes.iter().zip(&layout.outcomes) {
                if *before == FlowOutcome::Bundled {
                    assert_eq!(*after, FlowOutcome::Bundled, "threshold {}", k);
                }
            }
            assert!(layout.stats.too_long <= prev.stats.too_long);
        }
        previous = Some(layout);
    }
}

#[test]
fn test_identical_runs_identical_output() {
    let build = || {
        TestFlowBuilder::new()
            .add_location("A", 0.0, 0.0)
            .add_location("B", 4.0, 1.0)
            .add_location("C", 9.0, 0.5)
            .add_location("D", 6.0, 6.0)
            .add_location("E", 1.0, 5.0)
            .add_flow("A", "C", 3)
            .add_flow("A", "B", 1)
            .add_flow("B", "C", 2)
            .add_flow("C", "D", 1)
            .add_flow("D", "E", 4)
            .add_flow("E", "A", 1)
            .add_flow("A", "D", 2)
            .add_flow("B", "E", 1)
    };

    let first = run(build(), &BundlerConfig::default());
    let second = run(build(), &BundlerConfig::default());

    assert_eq!(first.stats, second.stats);
    assert_eq!(first.outcomes, second.outcomes);
    assert_eq!(first.bundles.len(), second.bundles.len());
    for (a, b) in first.bundles.iter().zip(&second.bundles) {
        assert_eq!(a.path, b.path);
        assert_eq!(a.control_points, b.control_points);
        assert_eq!(a.curve, b.curve);
    }
    assert_every_flow_classified(&first);
}

#[test]
fn test_unknown_endpoints_and_orphans_reported() {
    let builder = line_builder()
        .add_location("Lonely", 50.0, 50.0)
        .add_flow("A", "C", 1)
        .add_flow("A", "Nowhere", 1);

    let layout = run(builder, &BundlerConfig::default());

    assert_eq!(layout.stats.edges_removed, 1);
    // B has no flows left either
    assert_eq!(layout.stats.nodes_removed, 2);
    assert_eq!(layout.stats.total_flows, 1);
    assert_every_flow_classified(&layout);
}

#[test]
fn test_smoothing_levels_shape_control_points() {
    let config = BundlerConfig {
        smoothing: 3,
        samples: 10,
        ..BundlerConfig::default()
    };
    let builder = line_builder()
        .add_flow("A", "C", 1)
        .add_flow("A", "B", 1)
        .add_flow("B", "C", 1);

    let layout = run(builder, &config);

    let bundle = &layout.bundles[0];
    // 3 route vertices refined twice: (3 - 1) * 4 + 1
    assert_eq!(bundle.control_points.len(), 9);
    assert_eq!(bundle.curve.0.len(), 11);
}

#[test]
fn test_pipeline_from_record_batches() {
    let locations = RecordBatch::try_new(
        Arc::new(location_schema("NUTS_ID")),
        vec![
            Arc::new(StringArray::from(vec!["A", "B", "C"])) as ArrayRef,
            Arc::new(Float64Array::from(vec![0.0, 5.0, 10.0])) as ArrayRef,
            Arc::new(Float64Array::from(vec![0.0, 0.0, 0.0])) as ArrayRef,
        ],
    )
    .unwrap();
    let flows = RecordBatch::try_new(
        Arc::new(flow_schema()),
        vec![
            Arc::new(StringArray::from(vec!["A", "A", "B"])) as ArrayRef,
            Arc::new(StringArray::from(vec!["C", "B", "C"])) as ArrayRef,
            Arc::new(StringArray::from(vec![Some("A_C"), Some("A_B"), None])) as ArrayRef,
            Arc::new(Int64Array::from(vec![10, 2, 3])) as ArrayRef,
        ],
    )
    .unwrap();

    let locations = locations_from_batches(vec![Ok(locations)], "NUTS_ID").unwrap();
    let flows = flows_from_batches(vec![Ok(flows)]).unwrap();
    let layout = bundle_flows(&locations, &flows, &BundlerConfig::default()).unwrap();

    assert_eq!(layout.stats.bundled, 1);
    assert_eq!(layout.bundles[0].od_id, "A_C");
    let straight: Vec<&str> = layout.unbundled.iter().map(|u| u.od_id.as_str()).collect();
    assert_eq!(straight, vec!["A_B", "B_C"]);
}

#[test]
fn test_empty_input_is_configuration_error() {
    let (locations, _) = line_builder().records();
    let result = bundle_flows(&locations, &[], &BundlerConfig::default());
    assert!(matches!(result, Err(ConfigurationError::EmptyFlows)));
}
