//! Canned operator instructions per alert title.

use std::borrow::Cow;

// ---

/// One entry per parameter and direction.
pub const ACTION_CATALOGUE: &[(&str, &str)] = &[
    (
        "Luftfeuchtigkeit zu hoch",
        "ENTSCHEIDUNG: Entfeuchtungsanlage aktiviert | FOLGESCHRITTE: Aktuelle Werkstücke fertiglackieren, neue Aufträge pausieren, Klimaanlage auf Stufe 3, nach 5min Messwert prüfen, bei >60% Produktion fortsetzen",
    ),
    (
        "Luftfeuchtigkeit zu niedrig",
        "ENTSCHEIDUNG: Befeuchtungssystem aktiviert | FOLGESCHRITTE: Wassernebel-Düsen gestartet, Lackierroboter verlangsamen (80% Geschwindigkeit), Schichtdicke um 10% erhöhen, QS-Kontrolle nach 10 Werkstücken",
    ),
    (
        "Kabinentemperatur zu niedrig",
        "ENTSCHEIDUNG: Prozessgeschwindigkeit reduziert | FOLGESCHRITTE: IR-Heizstrahler auf Maximum, Vorheizzeit von 3min auf 8min erhöht, Werkstücke in Warteposition, Schichtleiter benachrichtigt, Produktion bei 20°C freigegeben",
    ),
    (
        "Kabinentemperatur zu hoch",
        "ENTSCHEIDUNG: Kühlprotokoll aktiviert | FOLGESCHRITTE: Abluftventilatoren 100%, Frischluftzufuhr maximiert, Trocknungszeit um 30% verlängert, Temperaturlog alle 30s, nächste 5 Teile Sonderprüfung",
    ),
    (
        "Energieverbrauch zu hoch",
        "ENTSCHEIDUNG: Energieoptimierung aktiviert | FOLGESCHRITTE: Kompressor-Druck von 6bar auf 5bar reduziert, Hallenbeleuchtung auf 70%, parallele Trocknungsprozesse gestaffelt (Verzögerung 2min), Wartungsteam für Leistungscheck eingeplant",
    ),
    (
        "Energieverbrauch zu niedrig",
        "ENTSCHEIDUNG: Energiemonitoring-Alarm | FOLGESCHRITTE: Roboter in Sicherheitsposition gefahren, Lackpumpen abgeschaltet, Instandhaltung alarmiert, Fehlerdiagnose gestartet, Schichtleiter informiert, Neustart nur nach Freigabe",
    ),
    (
        "Düsendruck zu hoch",
        "ENTSCHEIDUNG: Sprühparameter angepasst | FOLGESCHRITTE: Druckregler auf 2.8bar reduziert, nächste 3 Werkstücke Sprühbild-Kontrolle, Overspray-Messung durchgeführt, bei Abweichung >15% Filter wechseln, Roboterpfad unverändert",
    ),
    (
        "Düsendruck zu niedrig",
        "ENTSCHEIDUNG: Wartungsprotokoll aktiviert | FOLGESCHRITTE: Roboter in Wartungsposition, Lackpumpe auf Kavitation geprüft, Düsen demontiert und gereinigt, Zuleitungen auf Verstopfung untersucht, Testlackierung vor Freigabe, Ausfallzeit dokumentiert",
    ),
];

/// Instruction text for `title`; unknown titles get `Alarm: <title>`.
pub fn action_for(title: &str) -> Cow<'static, str> {
    // ---
    ACTION_CATALOGUE
        .iter()
        .find(|(t, _)| *t == title)
        .map(|(_, action)| Cow::Borrowed(*action))
        .unwrap_or_else(|| Cow::Owned(format!("Alarm: {title}")))
}
