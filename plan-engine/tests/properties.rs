use plan_config::FilterPolicy;
use plan_core::annotation::{DoorCandidate, DoorKind};
use plan_core::diagnostics::LogOnce;
use plan_core::entity::{BlockTable, Drawing, Entity, EntityId, Line, Primitive};
use plan_core::geometry::Point2;
use plan_core::text::Text;
use plan_engine::analysis::{analyze_structure, analyze_texts, arc_span_degrees};
use plan_engine::doors::deduplicate;
use plan_engine::filter::ImportanceFilter;
use proptest::prelude::*;

fn entity_strategy() -> impl Strategy<Value = Entity> {
    let coord = -10_000.0..10_000.0f64;
    let layer = prop::sample::select(vec!["WALL", "DOOR", "0", "FURN", "TEXT"]);
    prop_oneof![
        (layer.clone(), coord.clone(), coord.clone(), coord.clone(), coord.clone()).prop_map(
            |(layer, x1, y1, x2, y2)| Entity::new(
                layer,
                Primitive::Line(Line {
                    start: Point2::new(x1, y1),
                    end: Point2::new(x2, y2),
                }),
            )
        ),
        (layer, coord.clone(), coord, "[A-Z]{0,6}").prop_map(|(layer, x, y, content)| {
            Entity::new(
                layer,
                Primitive::Text(Text {
                    content,
                    position: Some(Point2::new(x, y)),
                    ..Text::default()
                }),
            )
        }),
    ]
}

fn door_strategy() -> impl Strategy<Value = DoorCandidate> {
    (-2_000.0..2_000.0f64, -2_000.0..2_000.0f64).prop_map(|(x, y)| DoorCandidate {
        kind: DoorKind::LayerDoor,
        center: Point2::new(x, y),
        radius: None,
        angle_span_degrees: None,
        mid_angle: None,
        confidence: 0.7,
        layer: "DOOR".into(),
        source: EntityId::new(0),
        marker: Point2::new(x, y),
    })
}

proptest! {
    #[test]
    fn bbox_min_never_exceeds_max(entities in prop::collection::vec(entity_strategy(), 1..40)) {
        let drawing = Drawing::new(entities, BlockTable::new());
        let analysis = analyze_structure(&drawing).expect("有坐标的输入应能分析");
        prop_assert!(analysis.bbox.min().x() <= analysis.bbox.max().x());
        prop_assert!(analysis.bbox.min().y() <= analysis.bbox.max().y());
    }

    #[test]
    fn filter_keeps_all_text_and_never_grows(
        entities in prop::collection::vec(entity_strategy(), 1..40),
        threshold in 0.0..1.2f64,
    ) {
        let policy = FilterPolicy { keep_threshold: threshold, ..FilterPolicy::default() };
        let mut drawing = Drawing::new(entities, BlockTable::new());
        let texts_before = drawing.iter().filter(|e| e.is_text()).count();
        let before = drawing.len();
        let analysis = analyze_structure(&drawing).expect("analysis");
        let report = ImportanceFilter::new(&policy).apply(&mut drawing, &analysis);
        prop_assert!(drawing.len() <= before);
        prop_assert_eq!(drawing.iter().filter(|e| e.is_text()).count(), texts_before);
        prop_assert_eq!(report.before - report.removed, report.after);
    }

    #[test]
    fn deduplicated_doors_are_pairwise_apart(
        doors in prop::collection::vec(door_strategy(), 0..30),
        tolerance in 1.0..500.0f64,
    ) {
        let kept = deduplicate(doors, tolerance);
        for (i, a) in kept.iter().enumerate() {
            for b in kept.iter().skip(i + 1) {
                let dx = (a.center.x() - b.center.x()).abs();
                let dy = (a.center.y() - b.center.y()).abs();
                prop_assert!(dx >= tolerance || dy >= tolerance);
            }
        }
    }

    #[test]
    fn arc_span_stays_within_half_turn(start in -20.0..20.0f64, end in -20.0..20.0f64) {
        let span = arc_span_degrees(start, end);
        prop_assert!((0.0..=180.0).contains(&span), "span = {}", span);
    }

    #[test]
    fn analysis_is_idempotent(entities in prop::collection::vec(entity_strategy(), 1..30)) {
        let drawing = Drawing::new(entities, BlockTable::new());
        let first = analyze_structure(&drawing).expect("analysis");
        let second = analyze_structure(&drawing).expect("analysis");
        prop_assert_eq!(first, second);
        let texts_a = analyze_texts(&drawing, &mut LogOnce::new());
        let texts_b = analyze_texts(&drawing, &mut LogOnce::new());
        prop_assert_eq!(texts_a, texts_b);
    }
}
