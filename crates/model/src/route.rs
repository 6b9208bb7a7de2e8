use chrono::NaiveDate;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use utility::id::{HasId, Id};

use crate::{
    point::Point,
    segment::{Segment, SegmentStatus},
    ExampleData, Progress,
};

/// The work assigned to a driver for one session.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Route {
    pub id: Id<Route>,
    pub name: String,
    pub due_date: NaiveDate,
    pub segments: Vec<Segment>,
}

impl HasId for Route {
    type IdType = String;
}

impl Route {
    pub fn segment(&self, id: &Id<Segment>) -> Option<&Segment> {
        self.segments.iter().find(|segment| &segment.id == id)
    }

    pub fn segment_mut(&mut self, id: &Id<Segment>) -> Option<&mut Segment> {
        self.segments.iter_mut().find(|segment| &segment.id == id)
    }

    pub fn started_segments(&self) -> impl Iterator<Item = &Segment> {
        self.segments
            .iter()
            .filter(|segment| segment.status == SegmentStatus::Started)
    }

    pub fn active_segment(&self) -> Option<&Segment> {
        self.started_segments().next()
    }

    pub fn total_points(&self) -> usize {
        self.segments.iter().map(|segment| segment.points.len()).sum()
    }

    pub fn executed_points(&self) -> usize {
        self.segments
            .iter()
            .map(|segment| segment.executed_count())
            .sum()
    }

    pub fn progress(&self) -> Progress {
        Progress::new(self.executed_points(), self.total_points())
    }
}

impl ExampleData for Route {
    fn example_data() -> Self {
        let zona_sul = vec![Point::new(
            "p1-1",
            -23.563744931352137,
            -46.67116887504856,
            "Rua Cardeal Arcoverde, 2365",
        )];

        let campo_belo = [
            (-23.553509, -46.662324),
            (-23.553832, -46.662443),
            (-23.553832, -46.662443),
            (-23.554155, -46.662572),
            (-23.554478, -46.662702),
            (-23.554940, -46.662889),
            (-23.555288, -46.663047),
            (-23.555741, -46.663236),
            (-23.556179, -46.663440),
        ]
        .into_iter()
        .enumerate()
        .map(|(i, (latitude, longitude))| {
            Point::new(
                format!("p2-{}", i + 1),
                latitude,
                longitude,
                format!("Ponto de Coleta {} - Campo Belo", i + 1),
            )
        })
        .collect();

        // spread on a small grid instead of random jitter, so runs are reproducible
        let brooklin = (0..23)
            .map(|i| {
                Point::new(
                    format!("p3-{}", i + 1),
                    -23.590520 + (i / 5) as f64 * 0.004,
                    -46.643308 + (i % 5) as f64 * 0.004,
                    format!("Ponto de Coleta {} - Brooklin", i + 1),
                )
            })
            .collect();

        Route {
            id: Id::new("1".to_owned()),
            name: "Rota São Paulo - Zona Sul".to_owned(),
            due_date: NaiveDate::from_ymd_opt(2024, 2, 15).unwrap_or(NaiveDate::MIN),
            segments: vec![
                Segment::new("seg1", 12.5, zona_sul),
                Segment::new("seg2", 15.3, campo_belo),
                Segment::new("seg3", 18.7, brooklin),
            ],
        }
    }
}
