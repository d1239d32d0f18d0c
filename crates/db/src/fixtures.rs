//! Deterministic demo rows for the embedded sqlite warehouse.

use serde::Serialize;
use sqlx::sqlite::SqlitePool;

const STATIONS: &[(i64, &str, f64, f64)] = &[
    (8103000, "Wien Hbf", 48.1851, 16.3762),
    (8100002, "Salzburg Hbf", 47.8130, 13.0457),
    (8100013, "Linz/Donau Hbf", 48.2902, 14.2917),
    (8100173, "Graz Hbf", 47.0722, 15.4170),
    (8100108, "Innsbruck Hbf", 47.2632, 11.4006),
];

const TRAINS: &[(&str, &str, &str)] = &[
    ("RJX 160", "RJX", "Railjet Xpress 160"),
    ("RJ 532", "RJ", "Railjet 532"),
    ("IC 690", "IC", "Intercity 690"),
    ("REX 1510", "REX", "Regionalexpress 1510"),
];

const HOLIDAYS: &[(&str, &str)] = &[
    ("2025-01-01", "Neujahr"),
    ("2025-01-06", "Heilige Drei Könige"),
    ("2025-04-21", "Ostermontag"),
    ("2025-05-01", "Staatsfeiertag"),
];

/// Arrivals and departures each get this many rows.
const MOVEMENTS: usize = 24;

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct DemoSeedSummary {
    pub station: u64,
    pub trainnames: u64,
    pub holidays: u64,
    pub arrivals: u64,
    pub departures: u64,
}

impl DemoSeedSummary {
    pub fn total(&self) -> u64 {
        self.station + self.trainnames + self.holidays + self.arrivals + self.departures
    }
}

struct Movement {
    time: String,
    eva: i64,
    trainid: &'static str,
    planned: String,
    minutes: i64,
    status: Option<&'static str>,
}

/// Movement `index` of the demo timetable. Delays, cancellations and extra
/// trains follow fixed residues so queries have stable answers.
fn movement(index: usize, offset_minutes: i64) -> Movement {
    let (eva, ..) = STATIONS[index % STATIONS.len()];
    let (trainid, ..) = TRAINS[index % TRAINS.len()];
    let day = 1 + index / 8;
    let hour = 6 + (index % 8) as i64;
    let planned_minute = (index as i64 * 5 + offset_minutes) % 60;
    let minutes = (index as i64 * 7 + offset_minutes) % 13;
    let status = if index % 11 == 5 {
        Some("Ausfall")
    } else if index % 13 == 7 {
        Some("Neu")
    } else {
        None
    };

    let planned = format!("2025-01-{day:02} {hour:02}:{planned_minute:02}:00");
    let actual_minute = planned_minute + minutes;
    let time = format!(
        "2025-01-{day:02} {:02}:{:02}:00",
        hour + actual_minute / 60,
        actual_minute % 60
    );

    Movement { time, eva, trainid, planned, minutes, status }
}

/// Creates the tracked tables under `schema` and replaces their contents.
pub async fn seed_demo_warehouse(
    pool: &SqlitePool,
    schema: &str,
) -> Result<DemoSeedSummary, sqlx::Error> {
    let mut tx = pool.begin().await?;

    let ddl = [
        format!(
            "CREATE TABLE IF NOT EXISTS {schema}.station (
                eva INTEGER PRIMARY KEY,
                name TEXT NOT NULL,
                latitude REAL,
                longitude REAL
            )"
        ),
        format!(
            "CREATE TABLE IF NOT EXISTS {schema}.trainnames (
                trainid TEXT PRIMARY KEY,
                category TEXT NOT NULL,
                name TEXT NOT NULL
            )"
        ),
        format!(
            "CREATE TABLE IF NOT EXISTS {schema}.holidays (
                date TEXT PRIMARY KEY,
                name TEXT NOT NULL
            )"
        ),
        format!(
            "CREATE TABLE IF NOT EXISTS {schema}.arrivals (
                time TEXT NOT NULL,
                eva INTEGER NOT NULL,
                trainid TEXT NOT NULL,
                plannedarrival TEXT NOT NULL,
                arrivalminutes INTEGER NOT NULL,
                arrivalstatus TEXT
            )"
        ),
        format!(
            "CREATE TABLE IF NOT EXISTS {schema}.departures (
                time TEXT NOT NULL,
                eva INTEGER NOT NULL,
                trainid TEXT NOT NULL,
                planneddeparture TEXT NOT NULL,
                departureminutes INTEGER NOT NULL,
                departurestatus TEXT
            )"
        ),
    ];
    for statement in &ddl {
        sqlx::query(statement).execute(&mut *tx).await?;
    }
    for table in ["arrivals", "departures", "station", "trainnames", "holidays"] {
        sqlx::query(&format!("DELETE FROM {schema}.{table}")).execute(&mut *tx).await?;
    }

    let mut summary = DemoSeedSummary::default();

    let insert_station = format!(
        "INSERT INTO {schema}.station (eva, name, latitude, longitude) VALUES (?, ?, ?, ?)"
    );
    for (eva, name, latitude, longitude) in STATIONS {
        sqlx::query(&insert_station)
            .bind(eva)
            .bind(name)
            .bind(latitude)
            .bind(longitude)
            .execute(&mut *tx)
            .await?;
        summary.station += 1;
    }

    let insert_train =
        format!("INSERT INTO {schema}.trainnames (trainid, category, name) VALUES (?, ?, ?)");
    for (trainid, category, name) in TRAINS {
        sqlx::query(&insert_train).bind(trainid).bind(category).bind(name).execute(&mut *tx).await?;
        summary.trainnames += 1;
    }

    let insert_holiday = format!("INSERT INTO {schema}.holidays (date, name) VALUES (?, ?)");
    for (date, name) in HOLIDAYS {
        sqlx::query(&insert_holiday).bind(date).bind(name).execute(&mut *tx).await?;
        summary.holidays += 1;
    }

    let insert_arrival = format!(
        "INSERT INTO {schema}.arrivals
            (time, eva, trainid, plannedarrival, arrivalminutes, arrivalstatus)
         VALUES (?, ?, ?, ?, ?, ?)"
    );
    let insert_departure = format!(
        "INSERT INTO {schema}.departures
            (time, eva, trainid, planneddeparture, departureminutes, departurestatus)
         VALUES (?, ?, ?, ?, ?, ?)"
    );
    for index in 0..MOVEMENTS {
        for (statement, offset, counter) in [
            (&insert_arrival, 0, &mut summary.arrivals),
            (&insert_departure, 3, &mut summary.departures),
        ] {
            let movement = movement(index, offset);
            sqlx::query(statement)
                .bind(movement.time)
                .bind(movement.eva)
                .bind(movement.trainid)
                .bind(movement.planned)
                .bind(movement.minutes)
                .bind(movement.status)
                .execute(&mut *tx)
                .await?;
            *counter += 1;
        }
    }

    tx.commit().await?;
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::{movement, MOVEMENTS};

    #[test]
    fn movements_are_deterministic_and_well_formed() {
        let first = movement(5, 0);
        let again = movement(5, 0);

        assert_eq!(first.time, again.time);
        assert_eq!(first.status, Some("Ausfall"));
        assert_eq!(movement(7, 0).status, Some("Neu"));
        assert_eq!(movement(0, 0).planned, "2025-01-01 06:00:00");
        assert!((0..MOVEMENTS).all(|index| (0..13).contains(&movement(index, 3).minutes)));
    }
}
