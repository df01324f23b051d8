//! Declarative alert-rule definitions pushed to Grafana.
//!
//! Each rule evaluates the latest reading of one parameter (query `A`),
//! reduces it to a single value (`B`) and compares it with the threshold
//! (`C`). The worker later reads `B` back out of webhook payloads, so the
//! ref ids here and in [`crate::extract`] must agree.

use serde_json::{json, Value};

// ---

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    Gt,
    Lt,
}

impl Operator {
    pub fn symbol(&self) -> &'static str {
        match self {
            Operator::Gt => ">",
            Operator::Lt => "<",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AlertRule {
    pub title: &'static str,
    pub parameter: &'static str,
    pub threshold: f64,
    pub operator: Operator,
    pub description: &'static str,
    pub group: &'static str,
}

pub const ALERT_RULES: [AlertRule; 8] = [
    AlertRule {
        title: "Kabinentemperatur zu hoch",
        parameter: "kabinentemperatur",
        threshold: 28.0,
        operator: Operator::Gt,
        description: "SOFORTMASSNAHME: Kühlsystem auf Maximum | Laufende Teile: Trocknungszeit +30% verlängern | QUALITÄT: Sonderprüfung aller Teile | VERANTWORTLICH: Schichtleiter + QS-Labor",
        group: "Temperature Alerts",
    },
    AlertRule {
        title: "Kabinentemperatur zu niedrig",
        parameter: "kabinentemperatur",
        threshold: 18.0,
        operator: Operator::Lt,
        description: "SOFORTMASSNAHME: Heizregister auf 100%, Umluftventilatoren Maximum | PRODUKTIONSANPASSUNG: Taktzeit +15% | ÜBERWACHUNG: Temperatur alle 2min bis >20°C | VERANTWORTLICH: Schichtleiter",
        group: "Temperature Alerts",
    },
    AlertRule {
        title: "Luftfeuchtigkeit zu hoch",
        parameter: "luftfeuchtigkeit",
        threshold: 65.0,
        operator: Operator::Gt,
        description: "ENTFEUCHTUNG: Trockner-Aggregat auf Stufe 3 | PRODUKTIONSANPASSUNG: Charge beenden, 15min Pause | KONTROLLE: Nach 5min erneut messen, bei <60% Freigabe | VERANTWORTLICH: Anlagenfahrer",
        group: "Humidity Alerts",
    },
    AlertRule {
        title: "Luftfeuchtigkeit zu niedrig",
        parameter: "luftfeuchtigkeit",
        threshold: 30.0,
        operator: Operator::Lt,
        description: "BEFEUCHTUNG: Dampfgenerator starten (Sollwert 45%) | ROBOTER: Geschwindigkeit auf 80% | QS-KONTROLLE: Nächste 5 Teile 100%-Prüfung | Bei <25%: Produktionsstopp",
        group: "Humidity Alerts",
    },
    AlertRule {
        title: "Düsendruck zu hoch",
        parameter: "duesendruck",
        threshold: 3.2,
        operator: Operator::Gt,
        description: "SPRÜHPARAMETER: Druck auf 2.8bar reduzieren | PRÜFUNG: Sprühbild-Test an Probeplatte | VERANTWORTLICH: Lackierer + Schichtleiter | Bei >3.5bar: Anlage stoppen",
        group: "Pressure Alerts",
    },
    AlertRule {
        title: "Düsendruck zu niedrig",
        parameter: "duesendruck",
        threshold: 1.8,
        operator: Operator::Lt,
        description: "WARTUNG ERFORDERLICH | SOFORT: Düsensatz prüfen | REINIGUNG: Düsen spülen, Filter wechseln | TESTLAUF: Probeplatte lackieren | Bei <1.5bar: Produktionsstopp",
        group: "Pressure Alerts",
    },
    AlertRule {
        title: "Energieverbrauch zu hoch",
        parameter: "energieverbrauch",
        threshold: 28.0,
        operator: Operator::Gt,
        description: "ENERGIEOPTIMIERUNG | KOMPRESSOR: Druck auf 5.5bar reduzieren | PROZESSE: Heizung/Trocknung staffeln | PRÜFUNG: Lastspitzen-Analyse | VERANTWORTLICH: Schichtleiter + Facility Management",
        group: "Energy Alerts",
    },
    AlertRule {
        title: "Energieverbrauch zu niedrig",
        parameter: "energieverbrauch",
        threshold: 12.0,
        operator: Operator::Lt,
        description: "TEILAUSFALL ERKANNT | DIAGNOSE: Ausgefallene Komponente identifizieren | PRODUKTION: Auf Handbetrieb umstellen oder Charge unterbrechen | VERANTWORTLICH: Schichtleiter + Elektriker",
        group: "Energy Alerts",
    },
];

/// Grafana rule uid derived from the title, e.g.
/// `Düsendruck zu hoch` -> `duesendruck_zu_hoch`.
pub fn rule_uid(title: &str) -> String {
    crate::spelling::canonical_key(title).replace(' ', "_")
}

/// Threshold rendered the way annotations carry it (`28`, `3.2`).
fn threshold_text(threshold: f64) -> String {
    format!("{threshold}")
}

impl AlertRule {
    // ---
    pub fn uid(&self) -> String {
        rule_uid(self.title)
    }

    /// Provisioning payload for `POST /api/v1/provisioning/alert-rules`.
    pub fn to_payload(&self, datasource_uid: &str, folder_uid: &str) -> Value {
        // ---
        let threshold = threshold_text(self.threshold);
        let sql = format!(
            "SELECT NOW() as time, value FROM sensor_readings WHERE parameter='{}' ORDER BY recorded_at DESC LIMIT 1",
            self.parameter
        );

        json!({
            "uid": self.uid(),
            "title": self.title,
            "condition": "C",
            "data": [
                {
                    "refId": "A",
                    "queryType": "",
                    "relativeTimeRange": {"from": 60, "to": 0},
                    "datasourceUid": datasource_uid,
                    "model": {
                        "editorMode": "code",
                        "format": "table",
                        "rawQuery": true,
                        "rawSql": sql,
                        "refId": "A"
                    }
                },
                {
                    "refId": "B",
                    "queryType": "",
                    "relativeTimeRange": {"from": 60, "to": 0},
                    "datasourceUid": "__expr__",
                    "model": {
                        "datasource": {"type": "__expr__", "uid": "__expr__"},
                        "expression": "A",
                        "reducer": "last",
                        "settings": {"mode": ""},
                        "type": "reduce",
                        "refId": "B"
                    }
                },
                {
                    "refId": "C",
                    "queryType": "",
                    "relativeTimeRange": {"from": 60, "to": 0},
                    "datasourceUid": "__expr__",
                    "model": {
                        "datasource": {"type": "__expr__", "uid": "__expr__"},
                        "expression": format!("$B {} {}", self.operator.symbol(), threshold),
                        "type": "math",
                        "refId": "C"
                    }
                }
            ],
            "noDataState": "OK",
            "execErrState": "OK",
            "for": "20s",
            "annotations": {
                "summary": self.title,
                "description": self.description,
                "threshold": threshold,
                "__value__": "{{ $values.B.Value }}",
                "__threshold__": threshold
            },
            "labels": {},
            "folderUID": folder_uid,
            "ruleGroup": self.group
        })
    }
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;
    use crate::actions::ACTION_CATALOGUE;

    #[test]
    fn uid_is_transliterated_snake_case() {
        assert_eq!(rule_uid("Düsendruck zu hoch"), "duesendruck_zu_hoch");
        assert_eq!(rule_uid("Kabinentemperatur zu niedrig"), "kabinentemperatur_zu_niedrig");
    }

    #[test]
    fn every_rule_has_a_catalogue_action() {
        // ---
        for rule in &ALERT_RULES {
            assert!(
                ACTION_CATALOGUE.iter().any(|(t, _)| *t == rule.title),
                "no action for {}",
                rule.title
            );
        }
    }

    #[test]
    fn uids_are_unique() {
        let mut uids: Vec<_> = ALERT_RULES.iter().map(AlertRule::uid).collect();
        uids.sort();
        uids.dedup();
        assert_eq!(uids.len(), ALERT_RULES.len());
    }

    #[test]
    fn payload_wires_threshold_and_expression() {
        // ---
        let rule = &ALERT_RULES[4];
        let payload = rule.to_payload("pg-uid", "folder-uid");

        assert_eq!(payload["uid"], "duesendruck_zu_hoch");
        assert_eq!(payload["data"][0]["datasourceUid"], "pg-uid");
        assert_eq!(payload["data"][2]["model"]["expression"], "$B > 3.2");
        assert_eq!(payload["annotations"]["threshold"], "3.2");
        assert_eq!(payload["annotations"]["__threshold__"], "3.2");
        assert_eq!(payload["folderUID"], "folder-uid");
        assert!(payload["data"][0]["model"]["rawSql"]
            .as_str()
            .unwrap()
            .contains("parameter='duesendruck'"));

        let low = ALERT_RULES[1].to_payload("pg", "f");
        assert_eq!(low["data"][2]["model"]["expression"], "$B < 18");
    }
}
